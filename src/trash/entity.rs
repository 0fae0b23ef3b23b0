use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use super::ItemType;
use crate::models::{
    Appointment, CaseDocument, Dossier, Message, Notification, Task, Temoignage, User,
};
use crate::schema::{
    appointments, documents, dossiers, messages, notifications, tasks, temoignages, users,
};

const MAX_LABEL_CHARS: usize = 255;

/// A live row that can be snapshotted into the trash and re-inserted verbatim.
pub trait Trashable: Serialize + DeserializeOwned + Sized {
    const ITEM_TYPE: ItemType;

    /// Name of the live table, used to build default origins such as `admin.dossiers`.
    const COLLECTION: &'static str;

    fn entity_id(&self) -> Uuid;

    /// Short human-readable summary shown in trash listings.
    fn label(&self) -> String;

    fn find(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Self>>;

    fn insert(&self, conn: &mut PgConnection) -> QueryResult<usize>;

    fn remove(conn: &mut PgConnection, id: Uuid) -> QueryResult<usize>;
}

macro_rules! impl_trashable {
    ($model:ty, $table:ident, $item_type:expr, |$entity:ident| $label:expr) => {
        impl Trashable for $model {
            const ITEM_TYPE: ItemType = $item_type;
            const COLLECTION: &'static str = stringify!($table);

            fn entity_id(&self) -> Uuid {
                self.id
            }

            fn label(&self) -> String {
                let $entity = self;
                truncate_label($label)
            }

            fn find(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Self>> {
                $table::table
                    .find(id)
                    .select(<$model>::as_select())
                    .first(conn)
                    .optional()
            }

            fn insert(&self, conn: &mut PgConnection) -> QueryResult<usize> {
                diesel::insert_into($table::table).values(self).execute(conn)
            }

            fn remove(conn: &mut PgConnection, id: Uuid) -> QueryResult<usize> {
                diesel::delete($table::table.find(id)).execute(conn)
            }
        }
    };
}

impl_trashable!(Dossier, dossiers, ItemType::Dossier, |dossier| format!(
    "{} - {}",
    dossier.reference, dossier.title
));
impl_trashable!(CaseDocument, documents, ItemType::Document, |document| document
    .title
    .clone());
impl_trashable!(Appointment, appointments, ItemType::Appointment, |appointment| {
    appointment.title.clone()
});
impl_trashable!(Message, messages, ItemType::Message, |message| message
    .subject
    .clone()
    .filter(|subject| !subject.trim().is_empty())
    .unwrap_or_else(|| message.body.clone()));
impl_trashable!(Task, tasks, ItemType::Task, |task| task.title.clone());
impl_trashable!(Notification, notifications, ItemType::Notification, |notification| {
    notification.title.clone()
});
impl_trashable!(Temoignage, temoignages, ItemType::Temoignage, |temoignage| format!(
    "Témoignage de {}",
    temoignage.author_name
));
impl_trashable!(User, users, ItemType::User, |user| user.username.clone());

fn truncate_label(label: String) -> String {
    let trimmed = label.trim();
    if trimmed.chars().count() <= MAX_LABEL_CHARS {
        return trimmed.to_string();
    }
    let mut shortened: String = trimmed.chars().take(MAX_LABEL_CHARS - 1).collect();
    shortened.push('…');
    shortened
}
