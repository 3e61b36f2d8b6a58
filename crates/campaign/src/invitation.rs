//! Invitation text generation.
//!
//! A template has five sections, each a list of variants. Generating an
//! invitation picks one variant per section at random, resolves placeholders
//! against the contact and joins the sections in a fixed order.

use std::fmt;
use std::sync::OnceLock;

use database::{contact, template, Contact, Database, DatabaseError, Invitation, Template, TemplateSections};
use rand::seq::SliceRandom;
use rand::Rng;
use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::InvitationError;

/// A template section, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Greeting,
    Identifier,
    Message,
    Link,
    Optout,
}

impl Section {
    /// Every section, in the order they are joined.
    pub const ALL: [Section; 5] = [
        Section::Greeting,
        Section::Identifier,
        Section::Message,
        Section::Link,
        Section::Optout,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Section::Greeting => "greeting",
            Section::Identifier => "identifier",
            Section::Message => "message",
            Section::Link => "link",
            Section::Optout => "optout",
        }
    }

    fn variants(self, sections: &TemplateSections) -> &[String] {
        match self {
            Section::Greeting => &sections.greeting,
            Section::Identifier => &sections.identifier,
            Section::Message => &sections.message,
            Section::Link => &sections.link,
            Section::Optout => &sections.optout,
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check that every section has at least one variant.
pub fn validate_template(sections: &TemplateSections) -> Result<(), InvitationError> {
    match Section::ALL
        .into_iter()
        .find(|section| section.variants(sections).is_empty())
    {
        Some(section) => Err(InvitationError::EmptySection(section)),
        None => Ok(()),
    }
}

/// One step of the `{field}` resolver chain.
type Lookup = fn(&Contact, &str) -> Option<String>;

fn non_empty(value: &str) -> Option<String> {
    (!value.trim().is_empty()).then(|| value.to_string())
}

fn contact_attribute(contact: &Contact, name: &str) -> Option<String> {
    match name {
        "name" => non_empty(&contact.name),
        "phone" => non_empty(&contact.phone),
        "id" => non_empty(&contact.id),
        "campaign_id" => non_empty(&contact.campaign_id),
        _ => None,
    }
}

fn extra_field(contact: &Contact, name: &str) -> Option<String> {
    contact.field(name).and_then(non_empty)
}

/// Tried in order; the first hit wins. No hit leaves the token as written.
const FIELD_RESOLVERS: [Lookup; 2] = [contact_attribute, extra_field];

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[NAME\]|\{(\w+)\}").expect("placeholder pattern is valid"))
}

/// Replace `[NAME]`, `{extern_id}` and `{field}` tokens in one pass.
///
/// Substituted values are never scanned again.
pub fn resolve_placeholders(text: &str, contact: &Contact) -> String {
    placeholder_pattern()
        .replace_all(text, |caps: &Captures| match caps.get(1) {
            None => contact.name.clone(),
            Some(field) if field.as_str() == "extern_id" => {
                contact.field("extern_id").unwrap_or_default().to_string()
            }
            Some(field) => FIELD_RESOLVERS
                .iter()
                .find_map(|lookup| lookup(contact, field.as_str()))
                .unwrap_or_else(|| caps[0].to_string()),
        })
        .into_owned()
}

/// A generated invitation, not yet logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedInvitation {
    pub contact_id: String,
    pub text: String,
}

/// Generate one invitation using the thread-local RNG.
pub fn generate(template: &Template, contact: &Contact) -> Result<String, InvitationError> {
    generate_with(template, contact, &mut rand::thread_rng())
}

/// Generate one invitation with the given RNG.
pub fn generate_with<R: Rng + ?Sized>(
    template: &Template,
    contact: &Contact,
    rng: &mut R,
) -> Result<String, InvitationError> {
    if contact.campaign_id != template.campaign_id {
        return Err(InvitationError::CampaignMismatch {
            contact_id: contact.id.clone(),
            campaign_id: template.campaign_id.clone(),
        });
    }

    let mut parts = Vec::with_capacity(Section::ALL.len());
    for section in Section::ALL {
        let variant = section
            .variants(&template.sections)
            .choose(rng)
            .ok_or(InvitationError::EmptySection(section))?;
        parts.push(resolve_placeholders(variant, contact));
    }

    Ok(parts.join(" ").trim().to_string())
}

/// Generate invitations for many contacts.
///
/// The template is validated once up front; an invalid template aborts the
/// whole batch. Contacts that fail individually are logged and left out.
pub fn generate_many(
    template: &Template,
    contacts: &[Contact],
) -> Result<Vec<GeneratedInvitation>, InvitationError> {
    validate_template(&template.sections)?;

    let mut rng = rand::thread_rng();
    let generated = contacts
        .iter()
        .filter_map(|contact| match generate_with(template, contact, &mut rng) {
            Ok(text) => Some(GeneratedInvitation {
                contact_id: contact.id.clone(),
                text,
            }),
            Err(e) => {
                warn!(contact_id = %contact.id, template_id = %template.id, error = %e, "Skipping contact");
                None
            }
        })
        .collect();

    Ok(generated)
}

/// Generates invitations and appends them to the campaign's log.
#[derive(Debug, Clone)]
pub struct InvitationService {
    db: Database,
}

impl InvitationService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Generate invitations for the given contacts and log them.
    pub async fn generate_invitations(
        &self,
        campaign_id: &str,
        template_id: &str,
        contact_ids: &[String],
    ) -> Result<Vec<Invitation>, InvitationError> {
        let pool = self.db.pool();

        let template = match template::get_template(pool, template_id).await {
            Ok(template) if template.campaign_id == campaign_id => template,
            Ok(_) | Err(DatabaseError::NotFound { .. }) => {
                return Err(InvitationError::TemplateNotFound(template_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let contacts = contact::get_contacts(pool, contact_ids).await?;
        if let Some(missing) = contact_ids
            .iter()
            .find(|id| !contacts.iter().any(|c| &c.id == *id))
        {
            return Err(InvitationError::ContactNotFound(missing.clone()));
        }

        let generated = generate_many(&template, &contacts)?;
        if generated.is_empty() {
            return Err(InvitationError::NothingGenerated);
        }

        let entries: Vec<(String, String)> = generated
            .into_iter()
            .map(|invitation| (invitation.contact_id, invitation.text))
            .collect();
        let stored = template::append_invitations(pool, campaign_id, template_id, &entries).await?;

        info!(
            campaign_id,
            template_id,
            requested = contact_ids.len(),
            generated = stored.len(),
            "Invitations generated"
        );
        Ok(stored)
    }

    /// The campaign's invitation log, oldest first.
    pub async fn list_invitations(&self, campaign_id: &str) -> Result<Vec<Invitation>, InvitationError> {
        Ok(template::list_invitations(self.db.pool(), campaign_id).await?)
    }
}
