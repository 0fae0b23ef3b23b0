//! Daily activity log ("DLOG") export.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::{create_document_with_header, DocumentOptions, EntryError, EntryWriter, Layout, Letterhead};
use crate::audit;
use crate::locale;
use crate::models::AuditLog;

pub const DLOG_TITLE: &str = "Journal d'activité quotidien (DLOG)";

pub fn dlog_filename(date: NaiveDate) -> String {
    format!("dlog-{}.pdf", date.format("%Y-%m-%d"))
}

/// One "Action #n" section per log entry, in the order given. Callers pass
/// the day's entries sorted by creation time.
pub fn build_dlog(
    letterhead: Letterhead,
    generated_at: NaiveDateTime,
    date: NaiveDate,
    logs: &[AuditLog],
) -> Layout {
    let mut document =
        create_document_with_header(DocumentOptions::new(DLOG_TITLE, letterhead, generated_at));

    document.paragraph(&format!("Journée du {}", locale::format_long_date(date)));
    document.field("Nombre d'actions", logs.len().to_string());
    if let (Some(first), Some(last)) = (logs.first(), logs.last()) {
        document.field(
            "Période couverte",
            format!(
                "{} - {} (UTC)",
                locale::format_time(first.created_at),
                locale::format_time(last.created_at)
            ),
        );
    }
    document.spacer();

    for (index, log) in logs.iter().enumerate() {
        document.entry(&format!("Action #{}", index + 1), |writer| {
            write_log_entry(writer, log)
        });
    }

    document.finish()
}

fn write_log_entry(writer: &mut EntryWriter, log: &AuditLog) -> Result<(), EntryError> {
    let details = match &log.details {
        Value::Null => None,
        Value::Object(map) => Some(map),
        other => {
            return Err(EntryError::MalformedDetails(format!(
                "objet attendu, reçu {}",
                json_kind(other)
            )))
        }
    };

    writer.field(
        "Heure",
        format!("{} UTC", locale::format_time(log.created_at)),
    );
    writer.field(
        "Utilisateur",
        log.username.as_deref().unwrap_or("Système"),
    );
    writer.field("Action", describe_action(&log.action));
    match (&log.entity_type, log.entity_id) {
        (Some(kind), Some(id)) => writer.field("Élément", format!("{kind} {id}")),
        (Some(kind), None) => writer.field("Élément", kind),
        _ => {}
    }

    if let Some(details) = details {
        for (key, value) in details {
            let rendered = match value {
                Value::String(text) => text.clone(),
                Value::Null => "-".to_string(),
                other => other.to_string(),
            };
            writer.note(format!("{key} : {rendered}"));
        }
    }
    Ok(())
}

fn describe_action(action: &str) -> String {
    let label = match action {
        audit::ACTION_LOGIN => "Connexion",
        audit::ACTION_LOGOUT => "Déconnexion",
        audit::ACTION_CREATE => "Création",
        audit::ACTION_UPDATE => "Modification",
        audit::ACTION_TRASH_MOVE => "Mise à la corbeille",
        audit::ACTION_TRASH_RESTORE => "Restauration depuis la corbeille",
        audit::ACTION_TRASH_PURGE => "Suppression définitive",
        audit::ACTION_TRASH_PURGE_EXPIRED => "Purge des éléments expirés",
        audit::ACTION_DLOG_EXPORT => "Export du journal quotidien",
        other => return other.to_string(),
    };
    format!("{label} ({action})")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "booléen",
        Value::Number(_) => "nombre",
        Value::String(_) => "texte",
        Value::Array(_) => "tableau",
        Value::Object(_) => "objet",
    }
}
