mod catalog;
mod dashboard;
mod new_order;
mod order_detail;
mod order_list;
mod user_list;

pub use catalog::CatalogView;
pub use dashboard::DashboardView;
pub use new_order::NewOrderView;
pub use order_detail::OrderDetailView;
pub use order_list::OrderListView;
pub use user_list::UserListView;
