use crate::{
    config::Delivery,
    validation::{Service, ValidatedContactForm},
};
use lettre::{message::Mailbox, Address};
use serde::Serialize;
use thiserror::Error;
use tinytemplate::{error::Error as TemplateError, format_unescaped, TinyTemplate};
use tracing::warn;

const LEAD_NOTIFICATION_HTML: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/lead-notification.html"
));
const LEAD_NOTIFICATION_TEXT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/lead-notification.txt"
));
const THANK_YOU_HTML: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/thank-you.html"
));
const THANK_YOU_TEXT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/assets/thank-you.txt"
));

const THANK_YOU_SUBJECT: &str = "Thank you for your interest in Momentum Business Solutions";

/// One outgoing message in the shape Postmark's email endpoint expects.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Email {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub message_stream: String,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Error rendering email template: {0}")]
    Template(#[from] TemplateError),
    #[error("Cannot address email to {0}")]
    InvalidRecipient(String),
}

#[derive(Serialize)]
struct LeadContext<'a> {
    submitted_at: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    phone_number: &'a str,
    annual_revenue: &'static str,
    services: Vec<ServiceContext>,
    message: Option<&'a str>,
}

#[derive(Serialize)]
struct ServiceContext {
    label: &'static str,
    class: &'static str,
    colour: &'static str,
}

impl From<Service> for ServiceContext {
    fn from(service: Service) -> Self {
        let class = service.css_class();
        let colour = match class {
            "payroll" => "#4f7ee2",
            "consulting" => "#417848",
            "cleanup" => "#709fea",
            _ => "#53945c",
        };
        Self {
            label: service.label(),
            class,
            colour,
        }
    }
}

#[derive(Serialize)]
struct ThankYouContext<'a> {
    first_name: &'a str,
}

/// Builds the message telling the business about a new lead. Replies go to the lead.
pub fn lead_notification(
    form: &ValidatedContactForm,
    delivery: &Delivery,
    message_stream: &str,
    submitted_at: &str,
) -> Result<Email, EmailError> {
    let context = LeadContext {
        submitted_at,
        first_name: form.first_name,
        last_name: form.last_name,
        email: form.email,
        phone_number: form.phone_number,
        annual_revenue: form.annual_revenue.label(),
        services: form.services.iter().copied().map(Into::into).collect(),
        message: form.message,
    };
    Ok(Email {
        from: delivery.from.to_string(),
        to: delivery.to.to_string(),
        reply_to: reply_to_lead(form),
        subject: format!(
            "New Lead: Contact Form Submission - {} {}",
            form.first_name, form.last_name
        ),
        text_body: render(LEAD_NOTIFICATION_TEXT, &context, false)?,
        html_body: render(LEAD_NOTIFICATION_HTML, &context, true)?,
        message_stream: message_stream.into(),
    })
}

/// Builds the acknowledgement sent back to the person who filled in the form.
pub fn thank_you(
    form: &ValidatedContactForm,
    delivery: &Delivery,
    message_stream: &str,
) -> Result<Email, EmailError> {
    let context = ThankYouContext {
        first_name: form.first_name,
    };
    Ok(Email {
        from: delivery.from.to_string(),
        to: submitter_mailbox(form)?.to_string(),
        reply_to: None,
        subject: THANK_YOU_SUBJECT.into(),
        text_body: render(THANK_YOU_TEXT, &context, false)?,
        html_body: render(THANK_YOU_HTML, &context, true)?,
        message_stream: message_stream.into(),
    })
}

/// The lead's mailbox, or nothing when the address cannot appear in a header.
fn reply_to_lead(form: &ValidatedContactForm) -> Option<String> {
    match submitter_mailbox(form) {
        Ok(mailbox) => Some(mailbox.to_string()),
        Err(error) => {
            warn!("Sending lead notification without Reply-To: {error}");
            None
        }
    }
}

fn submitter_mailbox(form: &ValidatedContactForm) -> Result<Mailbox, EmailError> {
    let address: Address = form
        .email
        .parse()
        .map_err(|_| EmailError::InvalidRecipient(form.email.into()))?;
    Ok(Mailbox::new(
        Some(format!("{} {}", form.first_name, form.last_name)),
        address,
    ))
}

fn render<C: Serialize>(template: &str, context: &C, escape_html: bool) -> Result<String, EmailError> {
    const NAME: &str = "email";
    let mut tt = TinyTemplate::new();
    if !escape_html {
        tt.set_default_formatter(&format_unescaped);
    }
    tt.add_template(NAME, template)?;
    Ok(tt.render(NAME, context)?)
}
