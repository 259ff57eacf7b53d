//! The fixed catalog of Shopify entities a job may target.

pub const SUPPORTED_ENTITIES: [&str; 20] = [
    "products",
    "variants",
    "smart_collections",
    "custom_collections",
    "customers",
    "companies",
    "discounts",
    "draft_orders",
    "orders",
    "payouts",
    "pages",
    "blog_posts",
    "redirects",
    "files",
    "metaobjects",
    "menus",
    "metafields",
    "shop",
    "inventory",
    "locations",
];

/// Entities that can be exported but never imported.
pub const READ_ONLY_ENTITIES: [&str; 3] = ["orders", "payouts", "shop"];

/// Entity recorded on backup jobs; the entities actually covered travel in
/// `params.entities`.
pub const BACKUP_ENTITY: &str = "shop";

pub fn is_supported(entity: &str) -> bool {
    SUPPORTED_ENTITIES.contains(&entity)
}

pub fn is_read_only(entity: &str) -> bool {
    READ_ONLY_ENTITIES.contains(&entity)
}
