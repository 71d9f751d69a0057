//! Issuance form and bundle download

use std::fmt;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    Form,
};
use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::api::routes::ApiState;
use crate::pki::PKCS12_CONTENT_TYPE;
use crate::services::IssuanceOutcome;

const INDEX_PAGE: &str = include_str!("../../../static/index.html");

/// Form posted by the index page. The key is wiped when the form is dropped.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct IssueForm {
    #[serde(default)]
    pub preshared_key: String,
}

impl fmt::Debug for IssueForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssueForm").field("preshared_key", &"[REDACTED]").finish()
    }
}

pub async fn index_handler() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

pub async fn issue_bundle_handler(
    State(state): State<ApiState>,
    Form(form): Form<IssueForm>,
) -> Response {
    state.orchestrator.issue_for_secret(&form.preshared_key).await.into_response()
}

impl IntoResponse for IssuanceOutcome {
    fn into_response(self) -> Response {
        match self {
            IssuanceOutcome::Packaged { bundle, filename } => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, PKCS12_CONTENT_TYPE.to_string()),
                    (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
                    (header::CACHE_CONTROL, "no-store".to_string()),
                ],
                bundle,
            )
                .into_response(),
            IssuanceOutcome::Denied { message } => (StatusCode::FORBIDDEN, message).into_response(),
            IssuanceOutcome::Failed { reason } => {
                (StatusCode::INTERNAL_SERVER_ERROR, reason).into_response()
            }
        }
    }
}
