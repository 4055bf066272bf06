use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        addresses::{AddressList, CreateAddressRequest, UpdateAddressRequest},
        admin::{
            BulkInventoryItem, BulkInventoryRequest, BulkInventoryResult, Dashboard,
            InventoryAdjustRequest, LowStockList, ProductStats, ReviewStats, SalesStats,
            StatusCount, UserList, UserStats, UserWithStats,
        },
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        cart::{AddToCartRequest, CartLine, CartView, UpdateCartItemRequest},
        categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
        orders::{
            MarkShippedRequest, OrderList, OrderWithItems, PlaceOrderRequest,
            UpdateOrderStatusRequest,
        },
        payments::{CreatePaymentRequest, PaymentAttempt, PaymentCallback, PaymentSettlement},
        products::{CreateProductRequest, ProductDetail, ProductList, UpdateProductRequest},
        reviews::{CreateReviewRequest, ReviewList, UpdateReviewRequest},
        users::{Profile, UpdateProfileRequest, UpdateRoleRequest},
        wishlist::{AddToWishlistRequest, WishlistAdded, WishlistCount, WishlistItem, WishlistList},
    },
    entity::sea_orm_active_enums::{OrderStatus, PaymentMethod, PaymentStatus, UserRole},
    models::{Address, CartItem, Category, Order, OrderItem, Payment, Product, Review, User, WishlistEntry},
    response::{ApiResponse, Meta},
    routes::{
        admin, cart, categories, health, orders, payments, products, reviews, users, wishlist,
    },
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        users::register,
        users::login,
        users::me,
        users::update_me,
        users::delete_me,
        users::list_addresses,
        users::create_address,
        users::get_address,
        users::update_address,
        users::delete_address,
        categories::list_categories,
        categories::create_category,
        categories::get_category,
        categories::get_category_by_slug,
        categories::update_category,
        categories::delete_category,
        categories::get_ancestors,
        categories::get_descendants,
        products::list_products,
        products::create_product,
        products::get_product,
        products::get_product_by_slug,
        products::update_product,
        products::delete_product,
        products::list_product_reviews,
        cart::get_cart,
        cart::add_to_cart,
        cart::update_cart_item,
        cart::remove_from_cart,
        cart::clear_cart,
        orders::list_orders,
        orders::place_order,
        orders::get_order,
        orders::cancel_order,
        orders::get_order_payment,
        orders::create_payment,
        payments::payment_callback,
        reviews::create_review,
        reviews::list_my_reviews,
        reviews::get_review,
        reviews::update_review,
        reviews::delete_review,
        wishlist::list_wishlist,
        wishlist::add_to_wishlist,
        wishlist::clear_wishlist,
        wishlist::count_wishlist,
        wishlist::remove_from_wishlist,
        wishlist::move_to_cart,
        admin::dashboard,
        admin::list_users,
        admin::update_user_role,
        admin::list_all_orders,
        admin::get_order_admin,
        admin::update_order_status,
        admin::mark_shipped,
        admin::list_low_stock,
        admin::adjust_inventory,
        admin::bulk_update_inventory,
        admin::list_pending_reviews,
        admin::approve_review,
        admin::reject_review
    ),
    components(
        schemas(
            User,
            Address,
            Category,
            Product,
            CartItem,
            Order,
            OrderItem,
            Payment,
            Review,
            WishlistEntry,
            UserRole,
            OrderStatus,
            PaymentStatus,
            PaymentMethod,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            Profile,
            UpdateProfileRequest,
            UpdateRoleRequest,
            CreateAddressRequest,
            UpdateAddressRequest,
            AddressList,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            ProductDetail,
            AddToCartRequest,
            UpdateCartItemRequest,
            CartLine,
            CartView,
            PlaceOrderRequest,
            OrderWithItems,
            OrderList,
            UpdateOrderStatusRequest,
            MarkShippedRequest,
            PaymentCallback,
            PaymentSettlement,
            CreatePaymentRequest,
            PaymentAttempt,
            CreateReviewRequest,
            UpdateReviewRequest,
            ReviewList,
            AddToWishlistRequest,
            WishlistAdded,
            WishlistItem,
            WishlistList,
            WishlistCount,
            InventoryAdjustRequest,
            BulkInventoryItem,
            BulkInventoryRequest,
            BulkInventoryResult,
            LowStockList,
            UserWithStats,
            UserList,
            StatusCount,
            SalesStats,
            UserStats,
            ProductStats,
            ReviewStats,
            Dashboard,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<OrderWithItems>,
            ApiResponse<OrderList>,
            ApiResponse<CartView>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Users", description = "Registration, login and profile"),
        (name = "Addresses", description = "Saved shipping and billing addresses"),
        (name = "Categories", description = "Category tree"),
        (name = "Products", description = "Product catalog"),
        (name = "Cart", description = "Cart endpoints, by user or x-session-id"),
        (name = "Orders", description = "Order placement and history"),
        (name = "Payments", description = "Payment provider callbacks"),
        (name = "Reviews", description = "Product reviews"),
        (name = "Wishlist", description = "Saved products"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_group_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/users/login",
            "/api/order",
            "/api/payments/callback",
            "/api/admin/dashboard",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
