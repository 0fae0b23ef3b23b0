use chrono::NaiveDateTime;

use super::{create_document_with_header, DocumentOptions, EntryError, Layout, Letterhead};
use crate::locale;
use crate::models::{Appointment, CaseDocument, Dossier, Task};

pub struct DossierRecap {
    pub dossier: Dossier,
    pub documents: Vec<CaseDocument>,
    pub appointments: Vec<Appointment>,
    pub tasks: Vec<Task>,
}

pub fn recap_filename(dossier: &Dossier) -> String {
    let reference: String = dossier
        .reference
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
        .collect();
    format!("dossier-{reference}.pdf")
}

fn status_label(status: &str) -> &str {
    match status {
        "ouvert" => "Ouvert",
        "en_cours" => "En cours",
        "clos" => "Clos",
        "planifie" => "Planifié",
        "confirme" => "Confirmé",
        "annule" => "Annulé",
        other => other,
    }
}

pub fn build_recap(letterhead: Letterhead, generated_at: NaiveDateTime, recap: &DossierRecap) -> Layout {
    let dossier = &recap.dossier;
    let mut document = create_document_with_header(DocumentOptions::new(
        format!("Récapitulatif du dossier {}", dossier.reference),
        letterhead,
        generated_at,
    ));

    document.heading("Informations du dossier");
    document.field("Référence", &dossier.reference);
    document.field("Intitulé", &dossier.title);
    document.field("Statut", status_label(&dossier.status));
    document.field("Ouvert le", locale::format_datetime(dossier.created_at));
    document.field("Dernière mise à jour", locale::format_datetime(dossier.updated_at));
    if let Some(description) = dossier.description.as_deref().filter(|d| !d.trim().is_empty()) {
        document.spacer();
        document.paragraph(description);
    }
    document.spacer();

    document.heading(&format!("Documents ({})", recap.documents.len()));
    if recap.documents.is_empty() {
        document.note("Aucun document.");
    }
    for (index, item) in recap.documents.iter().enumerate() {
        document.entry(&format!("Document #{}", index + 1), |writer| {
            writer.field("Titre", &item.title);
            writer.field("Fichier", &item.filename);
            writer.field("Taille", locale::format_size(item.size_bytes));
            writer.field("Ajouté le", locale::format_datetime(item.uploaded_at));
            Ok(())
        });
    }

    document.heading(&format!("Rendez-vous ({})", recap.appointments.len()));
    if recap.appointments.is_empty() {
        document.note("Aucun rendez-vous.");
    }
    for (index, appointment) in recap.appointments.iter().enumerate() {
        document.entry(&format!("Rendez-vous #{}", index + 1), |writer| {
            if appointment.ends_at < appointment.starts_at {
                return Err(EntryError::Inconsistent(
                    "la fin précède le début".to_string(),
                ));
            }
            writer.field("Objet", &appointment.title);
            writer.field(
                "Horaire",
                format!(
                    "{} - {} (UTC)",
                    locale::format_datetime(appointment.starts_at),
                    locale::format_time(appointment.ends_at)
                ),
            );
            if let Some(location) = &appointment.location {
                writer.field("Lieu", location);
            }
            writer.field("Statut", status_label(&appointment.status));
            Ok(())
        });
    }

    document.heading(&format!("Tâches ({})", recap.tasks.len()));
    if recap.tasks.is_empty() {
        document.note("Aucune tâche.");
    }
    for (index, task) in recap.tasks.iter().enumerate() {
        document.entry(&format!("Tâche #{}", index + 1), |writer| {
            writer.field("Titre", &task.title);
            match task.due_at {
                Some(due_at) => writer.field("Échéance", locale::format_datetime(due_at)),
                None => writer.field("Échéance", "non définie"),
            }
            match task.completed_at {
                Some(done) => writer.field("État", format!("terminée le {}", locale::format_datetime(done))),
                None => writer.field("État", "à faire"),
            }
            Ok(())
        });
    }

    document.finish()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};
    use uuid::Uuid;

    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 11, 4)
            .and_then(|date| date.and_hms_opt(10, 0, 0))
            .unwrap()
    }

    fn dossier() -> Dossier {
        Dossier {
            id: Uuid::new_v4(),
            reference: "PL-2024/017".to_string(),
            title: "Succession Martin".to_string(),
            description: Some("Règlement de la succession.".to_string()),
            status: "ouvert".to_string(),
            client_id: None,
            partner_id: None,
            created_by: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn appointment(dossier_id: Uuid, starts_at: NaiveDateTime, ends_at: NaiveDateTime) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            dossier_id: Some(dossier_id),
            client_id: None,
            title: "Rendez-vous notaire".to_string(),
            location: Some("Lyon".to_string()),
            starts_at,
            ends_at,
            status: "planifie".to_string(),
            created_at: now(),
        }
    }

    #[test]
    fn recap_lists_sections() {
        let dossier = dossier();
        let recap = DossierRecap {
            documents: vec![CaseDocument {
                id: Uuid::new_v4(),
                dossier_id: Some(dossier.id),
                title: "Acte de notoriété".to_string(),
                filename: "acte.pdf".to_string(),
                content_type: Some("application/pdf".to_string()),
                size_bytes: 1536,
                uploaded_by: None,
                uploaded_at: now(),
            }],
            appointments: vec![
                appointment(dossier.id, now(), now() + Duration::hours(1)),
                appointment(dossier.id, now(), now() - Duration::hours(1)),
            ],
            tasks: Vec::new(),
            dossier,
        };

        let text = build_recap(
            Letterhead {
                organization: "Paw Legal".to_string(),
                subtitle: String::new(),
                contact: String::new(),
            },
            now(),
            &recap,
        )
        .text();

        assert!(text.contains("Récapitulatif du dossier PL-2024/017"));
        assert!(text.contains("Statut : Ouvert"));
        assert!(text.contains("Taille : 1,5 Ko"));
        assert!(text.contains("Rendez-vous #1\n"));
        assert!(text.contains("Rendez-vous #2 : entrée ignorée"));
        assert!(text.contains("Aucune tâche."));
    }

    #[test]
    fn filename_is_path_safe() {
        assert_eq!(recap_filename(&dossier()), "dossier-PL-2024_017.pdf");
    }
}
