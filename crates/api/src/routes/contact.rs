//! Contact form route handler.
//!
//! Visitors' questions are mailed to the farm inbox with the visitor as
//! Reply-To.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::Deserialize;
use tracing::instrument;

use super::{optional_field, parse_email, required_field, reject_body};
use crate::error::{AppError, FormResponse, Result, add_breadcrumb};
use crate::services::email::ContactMessage;
use crate::state::AppState;

const MAX_NAME_LEN: usize = 100;
const MAX_MESSAGE_LEN: usize = 5000;

/// Contact form data as posted by the storefront.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
}

impl ContactForm {
    /// Check the form and normalize its fields.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::BadRequest`] naming the first invalid field.
    pub fn validate(&self) -> Result<ContactMessage> {
        let email = parse_email(&self.email)?;
        let name = required_field(&self.name, "Name", MAX_NAME_LEN)?;
        let message = required_field(&self.message, "Message", MAX_MESSAGE_LEN)?;

        Ok(ContactMessage {
            name,
            email,
            phone: optional_field(self.phone.as_deref()),
            message,
        })
    }
}

/// Submit the contact form.
///
/// POST /api/contact
#[instrument(skip(state, payload))]
pub async fn submit(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ContactForm>, JsonRejection>,
) -> Result<Json<FormResponse>> {
    let Json(form) = payload.map_err(reject_body)?;
    let contact = form.validate()?;

    add_breadcrumb("form", "Contact form submitted", &[]);
    let email = contact.compose(&state.config().email.contact_recipient)?;
    state.mailer().send(email).await?;

    tracing::info!(from = %contact.email, "Contact message delivered");
    Ok(Json(FormResponse {
        success: true,
        message: Some("Thanks for reaching out! We'll get back to you soon.".to_string()),
    }))
}
