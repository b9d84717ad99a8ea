use std::backtrace::Backtrace;

use log::error;
use rocket::http::Status;
use rocket::request::FlashMessage;
use rocket::response::status::Custom;
use rocket::response::{Flash, Redirect};
use rocket_dyn_templates::Template;
use serde::Serialize;

/// What a form submission turns into: a flash-carrying redirect, or the
/// form page re-rendered with its field errors.
#[derive(Responder)]
pub enum FormResponse {
    Redirect(Flash<Redirect>),
    Page(Template),
}

#[derive(Serialize)]
pub struct FlashNote {
    pub kind: String,
    pub message: String,
}

pub(crate) fn flash_note(flash: Option<FlashMessage<'_>>) -> Option<FlashNote> {
    flash.map(|f| FlashNote {
        // anything that is not a success renders as a "danger" alert box
        kind: if f.kind() == "success" { "success" } else { "danger" }.to_string(),
        message: f.message().to_string(),
    })
}

pub(crate) fn status_sqlx_error(err: sqlx::Error) -> Custom<String> {
    error!("SQL Error: {err}\nbacktrace: {}", Backtrace::capture());
    Custom(Status::InternalServerError, String::from("Something went wrong."))
}
pub(crate) fn status_any_error(err: anyhow::Error) -> Custom<String> {
    error!("Error: {err}\nbacktrace: {}", Backtrace::capture());
    Custom(Status::InternalServerError, String::from("Something went wrong."))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(dbe) if dbe.is_unique_violation())
}

pub(crate) fn titlecase(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[test]
fn test_titlecase() {
    assert_eq!(titlecase(""), "");
    assert_eq!(titlecase("anna"), "Anna");
    assert_eq!(titlecase("aNNA"), "Anna");
    assert_eq!(titlecase("édith"), "Édith");
}
