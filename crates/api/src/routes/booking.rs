//! Service booking route handler.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::instrument;

use super::{optional_field, parse_email, reject_body, required_field};
use crate::error::{AppError, FormResponse, Result, add_breadcrumb};
use crate::services::email::BookingMessage;
use crate::state::AppState;

const MAX_NAME_LEN: usize = 100;
const MAX_SERVICE_LEN: usize = 100;
const MAX_NOTES_LEN: usize = 2000;

/// Booking request as posted by the storefront.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BookingForm {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub service: String,
    /// `YYYY-MM-DD`
    pub preferred_date: String,
    pub notes: Option<String>,
}

impl BookingForm {
    /// Check the form against `today` and normalize its fields.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::BadRequest`] naming the first invalid field.
    pub fn validate(&self, today: NaiveDate) -> Result<BookingMessage> {
        let email = parse_email(&self.email)?;
        let name = required_field(&self.name, "Name", MAX_NAME_LEN)?;
        let service = required_field(&self.service, "Service", MAX_SERVICE_LEN)?;

        let preferred_date = NaiveDate::parse_from_str(self.preferred_date.trim(), "%Y-%m-%d")
            .map_err(|_| AppError::BadRequest("Please choose a preferred date.".to_string()))?;
        if preferred_date < today {
            return Err(AppError::BadRequest(
                "The preferred date can't be in the past.".to_string(),
            ));
        }

        let notes = optional_field(self.notes.as_deref());
        if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
            return Err(AppError::BadRequest(format!(
                "Notes must be at most {MAX_NOTES_LEN} characters."
            )));
        }

        Ok(BookingMessage {
            name,
            email,
            phone: optional_field(self.phone.as_deref()),
            service,
            preferred_date,
            notes,
        })
    }
}

/// Submit a booking request.
///
/// POST /api/booking
#[instrument(skip(state, payload))]
pub async fn submit(
    State(state): State<AppState>,
    payload: std::result::Result<Json<BookingForm>, JsonRejection>,
) -> Result<Json<FormResponse>> {
    let Json(form) = payload.map_err(reject_body)?;
    let booking = form.validate(Utc::now().date_naive())?;

    add_breadcrumb("form", "Booking requested", &[("service", booking.service.as_str())]);
    let email = booking.compose(&state.config().email.contact_recipient)?;
    state.mailer().send(email).await?;

    tracing::info!(
        from = %booking.email,
        service = %booking.service,
        date = %booking.preferred_date,
        "Booking request delivered"
    );
    Ok(Json(FormResponse {
        success: true,
        message: Some("Booking request received! We'll confirm by email.".to_string()),
    }))
}
