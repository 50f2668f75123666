use salvo::prelude::*;

use crate::handlers::{app_state, render_error};

/// Serves the catalog cached at startup; no upstream call per request.
#[handler]
pub async fn list_models(depot: &mut Depot, res: &mut Response) {
    match app_state(depot) {
        Ok(state) => {
            let catalog = state.catalog().await;
            res.render(Json(catalog.models().clone()));
        }
        Err(error) => render_error(res, &error),
    }
}
