use crate::{config::AppConfig, services::guestbook::GuestbookService};
use std::sync::Arc;

/// Shared state handed to every handler and the admin middleware.
#[derive(Clone)]
pub struct AppState {
    pub service: GuestbookService,
    pub config: Arc<AppConfig>,
}
