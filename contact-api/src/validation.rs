use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::LazyLock;

const NAME_MIN_LENGTH: usize = 2;
const NAME_MAX_LENGTH: usize = 50;
const EMAIL_MAX_LENGTH: usize = 254;
const MESSAGE_MAX_LENGTH: usize = 2000;

static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)^[a-zA-Z\s'\-]+$").unwrap());
static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").unwrap()
});
static PHONE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?-u)^\+?[1-9]?[\d\s\-().]{10,15}$").unwrap());

/// A contact form submission exactly as posted by the website.
///
/// Fields that are missing or `null` decode as empty.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct ContactForm {
    #[serde(rename = "first-name", deserialize_with = "null_as_empty")]
    pub first_name: String,
    #[serde(rename = "last-name", deserialize_with = "null_as_empty")]
    pub last_name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(rename = "phone-number", deserialize_with = "null_as_empty")]
    pub phone_number: String,
    #[serde(rename = "annual-revenue", deserialize_with = "null_as_empty")]
    pub annual_revenue: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub services: Vec<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub message: String,
    /// Honeypot, hidden from human visitors.
    #[serde(deserialize_with = "null_as_empty")]
    pub website: String,
    #[serde(rename = "cf-turnstile-response", deserialize_with = "null_as_empty")]
    pub turnstile_token: String,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Annual revenue buckets offered by the form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnualRevenue {
    Under100k,
    From100kTo500k,
    From500kTo1m,
    From1mTo5m,
    Over5m,
}

/// Services a lead can express interest in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Service {
    Essentials,
    GrowthStrategy,
    CompleteSupport,
    Consulting,
    Cleanup,
}

static REVENUE_RANGES: [(&str, AnnualRevenue, &str); 5] = [
    ("under-100k", AnnualRevenue::Under100k, "Under $100,000"),
    ("100k-500k", AnnualRevenue::From100kTo500k, "$100,000 - $500,000"),
    ("500k-1m", AnnualRevenue::From500kTo1m, "$500,000 - $1,000,000"),
    ("1m-5m", AnnualRevenue::From1mTo5m, "$1,000,000 - $5,000,000"),
    ("over-5m", AnnualRevenue::Over5m, "Over $5,000,000"),
];

// (code, service, label, css class of the tag in the notification email)
static SERVICES: [(&str, Service, &str, &str); 5] = [
    ("essentials", Service::Essentials, "Essentials Package", "bookkeeping"),
    ("growth-strategy", Service::GrowthStrategy, "Growth Strategy Package", "payroll"),
    ("complete-support", Service::CompleteSupport, "Complete Business Support", "consulting"),
    ("consulting", Service::Consulting, "Financial Consulting", "consulting"),
    ("cleanup", Service::Cleanup, "QuickBooks Cleanup", "cleanup"),
];

impl AnnualRevenue {
    pub fn from_code(code: &str) -> Option<Self> {
        REVENUE_RANGES
            .iter()
            .find(|(candidate, ..)| *candidate == code)
            .map(|(_, revenue, _)| *revenue)
    }

    pub fn label(self) -> &'static str {
        REVENUE_RANGES
            .iter()
            .find(|(_, revenue, _)| *revenue == self)
            .map(|(.., label)| *label)
            .unwrap_or_default()
    }
}

impl Service {
    pub fn from_code(code: &str) -> Option<Self> {
        SERVICES
            .iter()
            .find(|(candidate, ..)| *candidate == code)
            .map(|(_, service, ..)| *service)
    }

    pub fn label(self) -> &'static str {
        self.entry().map(|(_, _, label, _)| *label).unwrap_or_default()
    }

    pub fn css_class(self) -> &'static str {
        self.entry().map(|(.., class)| *class).unwrap_or("bookkeeping")
    }

    fn entry(self) -> Option<&'static (&'static str, Service, &'static str, &'static str)> {
        SERVICES.iter().find(|(_, service, ..)| *service == self)
    }
}

/// A problem with one field of the form, as reported to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// The non-empty list of problems found in a submission, in field order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    pub fn into_errors(self) -> Vec<FieldError> {
        self.0
    }
}

/// A submission which passed validation, with the coded fields resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedContactForm<'a> {
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub phone_number: &'a str,
    pub annual_revenue: AnnualRevenue,
    pub services: Vec<Service>,
    pub message: Option<&'a str>,
}

impl ContactForm {
    pub fn is_honeypot_filled(&self) -> bool {
        !self.website.trim().is_empty()
    }

    /// Strips surrounding whitespace from every free-text field.
    pub fn trimmed(self) -> Self {
        fn trim(value: String) -> String {
            value.trim().to_string()
        }
        Self {
            first_name: trim(self.first_name),
            last_name: trim(self.last_name),
            email: trim(self.email),
            phone_number: trim(self.phone_number),
            annual_revenue: trim(self.annual_revenue),
            message: trim(self.message),
            ..self
        }
    }

    /// Runs every field check and collects all failures.
    pub fn validate(&self) -> Result<ValidatedContactForm<'_>, ValidationErrors> {
        let mut errors = Vec::new();
        let mut report = |field, message: String| errors.push(FieldError { field, message });

        if let Some(message) = check_name("First name", &self.first_name) {
            report("first-name", message);
        }
        if let Some(message) = check_name("Last name", &self.last_name) {
            report("last-name", message);
        }

        let email = self.email.trim();
        if email.is_empty() {
            report("email", "Email is required".into());
        } else if email.chars().count() > EMAIL_MAX_LENGTH {
            report(
                "email",
                format!("Email must be less than {EMAIL_MAX_LENGTH} characters"),
            );
        } else if !EMAIL_PATTERN.is_match(email) {
            report("email", "Please enter a valid email address".into());
        }

        let phone_number = self.phone_number.trim();
        if phone_number.is_empty() {
            report("phone-number", "Phone number is required".into());
        } else if !PHONE_PATTERN.is_match(phone_number) {
            report("phone-number", "Please enter a valid phone number".into());
        }

        let revenue_code = self.annual_revenue.trim();
        let annual_revenue = AnnualRevenue::from_code(revenue_code);
        if revenue_code.is_empty() {
            report(
                "annual-revenue",
                "Please select your annual revenue range".into(),
            );
        } else if annual_revenue.is_none() {
            report("annual-revenue", "Please select a valid revenue range".into());
        }

        let mut services = Vec::with_capacity(self.services.len());
        if self.services.is_empty() {
            report(
                "services",
                "Please select at least one service you're interested in".into(),
            );
        } else {
            for code in &self.services {
                let Some(service) = Service::from_code(code) else {
                    report("services", format!("Invalid service selected: {code}"));
                    break;
                };
                services.push(service);
            }
        }

        if self.message.chars().count() > MESSAGE_MAX_LENGTH {
            report(
                "message",
                format!("Message must be less than {MESSAGE_MAX_LENGTH} characters"),
            );
        }

        match annual_revenue {
            Some(annual_revenue) if errors.is_empty() => Ok(ValidatedContactForm {
                first_name: self.first_name.trim(),
                last_name: self.last_name.trim(),
                email,
                phone_number,
                annual_revenue,
                services,
                message: Some(self.message.trim()).filter(|message| !message.is_empty()),
            }),
            _ => Err(ValidationErrors(errors)),
        }
    }
}

fn check_name(label: &str, value: &str) -> Option<String> {
    let value = value.trim();
    let length = value.chars().count();
    if value.is_empty() {
        Some(format!("{label} is required"))
    } else if length < NAME_MIN_LENGTH {
        Some(format!(
            "{label} must be at least {NAME_MIN_LENGTH} characters"
        ))
    } else if length > NAME_MAX_LENGTH {
        Some(format!(
            "{label} must be less than {NAME_MAX_LENGTH} characters"
        ))
    } else if !NAME_PATTERN.is_match(value) {
        Some(format!(
            "{label} can only contain letters, spaces, hyphens, and apostrophes"
        ))
    } else {
        None
    }
}
