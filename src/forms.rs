//! Form payloads and their field-level validation.
//!
//! Every form is deserialized from the submitted body, trimmed with `normalize`, checked with
//! the `validator` derive and turned into [`FormErrors`] for the template to show next to the
//! inputs. Checks that need the database (unique username, existing category) are added by the
//! handlers on top of these.

use std::{borrow::Cow, collections::BTreeMap, collections::HashMap};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidateEmail, ValidationError, ValidationErrors};

use crate::models::{NewCategory, NewLocation, Post, ProfileUpdate};

pub const REQUIRED: &str = "This field is required.";
/// Key for errors that belong to the whole form rather than one field.
pub const NON_FIELD: &str = "__all__";

const PUB_DATE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Matches the `categories.slug` column.
const SLUG_MAX_LENGTH: usize = 50;

/// Value format of `<input type="datetime-local">`.
pub const DATETIME_INPUT_FORMAT: &str = "%Y-%m-%dT%H:%M";

// --- Errors ---

/// FormErrors
///
/// Field name to error messages, serialized as a plain map for the templates.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl From<ValidationErrors> for FormErrors {
    fn from(errors: ValidationErrors) -> Self {
        let mut out = FormErrors::default();
        for (field, field_errors) in errors.field_errors() {
            for error in field_errors.iter() {
                let message = error
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value ({}).", error.code));
                out.add(&field, message);
            }
        }
        out
    }
}

/// Runs the derive validation and collects the result.
pub fn validate_form<F: Validate>(form: &F) -> FormErrors {
    match form.validate() {
        Ok(()) => FormErrors::default(),
        Err(errors) => errors.into(),
    }
}

fn error(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

// --- Field validators ---

fn max_150(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() <= 150 {
        Ok(())
    } else {
        Err(error("max_length", "Ensure this value has at most 150 characters."))
    }
}

fn max_256(value: &str) -> Result<(), ValidationError> {
    if value.chars().count() <= 256 {
        Ok(())
    } else {
        Err(error("max_length", "Ensure this value has at most 256 characters."))
    }
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    max_150(username)?;
    let allowed = |c: char| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_');
    if username.chars().all(allowed) {
        Ok(())
    } else {
        Err(error(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        ))
    }
}

fn validate_optional_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() || email.validate_email() {
        Ok(())
    } else {
        Err(error("email", "Enter a valid email address."))
    }
}

fn validate_not_numeric(password: &str) -> Result<(), ValidationError> {
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        Err(error("password_entirely_numeric", "This password is entirely numeric."))
    } else {
        Ok(())
    }
}

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if slug.chars().count() > SLUG_MAX_LENGTH {
        return Err(error("max_length", "Ensure this value has at most 50 characters."));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_';
    if slug.chars().all(allowed) {
        Ok(())
    } else {
        Err(error(
            "slug",
            "Enter a valid slug consisting of Latin letters, numbers, underscores or hyphens.",
        ))
    }
}

fn validate_pub_date(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || parse_pub_date(value).is_some() {
        Ok(())
    } else {
        Err(error("pub_date", "Enter a valid date/time."))
    }
}

fn validate_optional_id(value: &str) -> Result<(), ValidationError> {
    if value.is_empty() || value.parse::<i64>().is_ok() {
        Ok(())
    } else {
        Err(error(
            "invalid_choice",
            "Select a valid choice. That choice is not one of the available choices.",
        ))
    }
}

fn validate_passwords_match(form: &RegistrationForm) -> Result<(), ValidationError> {
    if form.password1 == form.password2 {
        Ok(())
    } else {
        Err(error("password_mismatch", "The two password fields didn't match."))
    }
}

/// Parses the publication date accepted by the post form. Naive values are taken as UTC.
pub fn parse_pub_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    PUB_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
}

fn parse_id(value: &str) -> Option<i64> {
    if value.is_empty() {
        None
    } else {
        value.parse().ok()
    }
}

fn checkbox(value: &Option<String>) -> bool {
    matches!(value.as_deref(), Some(v) if !v.is_empty() && v != "off" && v != "false")
}

// --- Account forms ---

/// RegistrationForm
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_passwords_match", skip_on_field_errors = false))]
pub struct RegistrationForm {
    #[serde(default)]
    #[validate(
        length(min = 1, message = "This field is required."),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[serde(default)]
    #[validate(custom(function = "validate_optional_email"))]
    pub email: String,
    #[serde(default)]
    #[validate(custom(function = "max_150"))]
    pub first_name: String,
    #[serde(default)]
    #[validate(custom(function = "max_150"))]
    pub last_name: String,
    #[serde(default, skip_serializing)]
    #[validate(
        length(min = 8, message = "This password is too short. It must contain at least 8 characters."),
        custom(function = "validate_not_numeric")
    )]
    pub password1: String,
    #[serde(default, skip_serializing)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub password2: String,
}

impl RegistrationForm {
    pub fn normalize(&mut self) {
        self.username = self.username.trim().to_string();
        self.email = self.email.trim().to_string();
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
    }
}

/// LoginForm
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct LoginForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub username: String,
    #[serde(default, skip_serializing)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub password: String,
    // Path to return to after a successful login.
    #[serde(default)]
    pub next: Option<String>,
}

/// ProfileForm
///
/// The editable part of a user's profile. The username is fixed after registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ProfileForm {
    #[serde(default)]
    #[validate(custom(function = "validate_optional_email"))]
    pub email: String,
    #[serde(default)]
    #[validate(custom(function = "max_150"))]
    pub first_name: String,
    #[serde(default)]
    #[validate(custom(function = "max_150"))]
    pub last_name: String,
}

impl ProfileForm {
    pub fn normalize(&mut self) {
        self.email = self.email.trim().to_string();
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
    }

    pub fn into_update(self) -> ProfileUpdate {
        ProfileUpdate {
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
        }
    }
}

// --- Blog forms ---

/// PostForm
///
/// Text fields of the post create/edit form. The picture travels separately in the multipart
/// body. `category` and `location` hold the selected ids as submitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PostForm {
    #[serde(default)]
    #[validate(
        length(min = 1, message = "This field is required."),
        custom(function = "max_256")
    )]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub text: String,
    #[serde(default)]
    #[validate(
        length(min = 1, message = "This field is required."),
        custom(function = "validate_pub_date")
    )]
    pub pub_date: String,
    #[serde(default)]
    #[validate(
        length(min = 1, message = "This field is required."),
        custom(function = "validate_optional_id")
    )]
    pub category: String,
    #[serde(default)]
    #[validate(custom(function = "validate_optional_id"))]
    pub location: String,
}

impl PostForm {
    /// Builds the form from already-collected multipart text fields.
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let field = |name: &str| fields.get(name).map(|v| v.trim().to_string()).unwrap_or_default();
        Self {
            title: field("title"),
            // Only the trailing/leading whitespace is dropped, inner line breaks survive.
            text: field("text"),
            pub_date: field("pub_date"),
            category: field("category"),
            location: field("location"),
        }
    }

    /// Prefills the edit form with the stored values.
    pub fn from_post(post: &Post) -> Self {
        Self {
            title: post.title.clone(),
            text: post.text.clone(),
            pub_date: post.pub_date.format(DATETIME_INPUT_FORMAT).to_string(),
            category: post.category_id.map(|id| id.to_string()).unwrap_or_default(),
            location: post.location_id.map(|id| id.to_string()).unwrap_or_default(),
        }
    }

    pub fn pub_date(&self) -> Option<DateTime<Utc>> {
        parse_pub_date(&self.pub_date)
    }

    pub fn category_id(&self) -> Option<i64> {
        parse_id(&self.category)
    }

    pub fn location_id(&self) -> Option<i64> {
        parse_id(&self.location)
    }
}

/// CommentForm
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CommentForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub text: String,
}

impl CommentForm {
    pub fn normalize(&mut self) {
        self.text = self.text.trim().to_string();
    }
}

// --- Staff forms ---

/// CategoryForm
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CategoryForm {
    #[serde(default)]
    #[validate(
        length(min = 1, message = "This field is required."),
        custom(function = "max_256")
    )]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub description: String,
    #[serde(default)]
    #[validate(
        length(min = 1, message = "This field is required."),
        custom(function = "validate_slug")
    )]
    pub slug: String,
    #[serde(default)]
    pub is_published: Option<String>,
}

impl CategoryForm {
    pub fn normalize(&mut self) {
        self.title = self.title.trim().to_string();
        self.description = self.description.trim().to_string();
        self.slug = self.slug.trim().to_string();
    }

    pub fn into_new(self) -> NewCategory {
        let is_published = checkbox(&self.is_published);
        NewCategory {
            title: self.title,
            description: self.description,
            slug: self.slug,
            is_published,
        }
    }
}

/// LocationForm
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct LocationForm {
    #[serde(default)]
    #[validate(
        length(min = 1, message = "This field is required."),
        custom(function = "max_256")
    )]
    pub name: String,
    #[serde(default)]
    pub is_published: Option<String>,
}

impl LocationForm {
    pub fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
    }

    pub fn into_new(self) -> NewLocation {
        let is_published = checkbox(&self.is_published);
        NewLocation {
            name: self.name,
            is_published,
        }
    }
}

/// PostVisibilityForm
///
/// Staff toggle of a post's publication flag. An unchecked box submits nothing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostVisibilityForm {
    #[serde(default)]
    pub is_published: Option<String>,
}

impl PostVisibilityForm {
    pub fn is_published(&self) -> bool {
        checkbox(&self.is_published)
    }
}
