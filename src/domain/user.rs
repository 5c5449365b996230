use super::entity::{Comparator, Entity, EntityKind, Record, Related, unknown_relation};
use super::enrollment::Enrollment;
use super::ports::{Source, SourceExt};
use super::rating::Rating;
use super::{Id, UserId};
use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: 0,
            name: name.into(),
            email: email.into(),
            role,
        }
    }
}

impl Entity for User {
    const KIND: EntityKind = EntityKind::User;
    const RELATIONS: &'static [&'static str] = &["enrollments", "ratings"];

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn comparator(field: &str) -> Option<Comparator<Self>> {
        match field {
            "id" => Some(|a, b| a.id.cmp(&b.id)),
            "name" => Some(|a, b| a.name.cmp(&b.name)),
            "email" => Some(|a, b| a.email.cmp(&b.email)),
            "role" => Some(|a, b| a.role.cmp(&b.role)),
            _ => None,
        }
    }

    fn into_record(self) -> Record {
        Record::User(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::User(u) => Some(u),
            _ => None,
        }
    }

    fn resolve(&self, source: &dyn Source, relation: &str) -> Result<Related> {
        match relation {
            "enrollments" => Ok(Related::many(
                source
                    .scan::<Enrollment>()
                    .into_iter()
                    .filter(|e| e.student_id == self.id)
                    .collect(),
            )),
            "ratings" => Ok(Related::many(
                source
                    .scan::<Rating>()
                    .into_iter()
                    .filter(|r| r.student_id == self.id)
                    .collect(),
            )),
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}
