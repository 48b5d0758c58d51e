//! Shared mapping fixtures for the unit tests: a small clinical-record
//! schema with a polymorphic classifier chain, a soft-deleted collection and
//! an always-joined foreign key.

use crate::marshal::{read_column, read_field};
use crate::{
    AsValue, ColumnDef, ColumnRef, Entity, GenericDialect, Passive, RelationDef, RelationKind,
    Result, RowLabeled, TableDef, TableRegistry, Value,
};
use std::sync::LazyLock;
use uuid::Uuid;

pub const GENERIC: GenericDialect = GenericDialect::new();

static CONCEPT: LazyLock<TableDef> = LazyLock::new(|| {
    TableDef::new("concept")
        .with_columns(vec![
            ColumnDef::new("concept", "id", Value::Uuid(None)).primary_key(),
            ColumnDef::new("concept", "mnemonic", Value::Varchar(None)).unique(),
        ])
        .with_classifier("mnemonic")
});

static ADDRESS: LazyLock<TableDef> = LazyLock::new(|| {
    TableDef::new("address")
        .with_columns(vec![
            ColumnDef::new("address", "id", Value::Uuid(None)).primary_key(),
            ColumnDef::new("address", "patient_id", Value::Uuid(None))
                .references(ColumnRef::new("patient", "id")),
            ColumnDef::new("address", "use_concept_id", Value::Uuid(None))
                .references(ColumnRef::new("concept", "id")),
            ColumnDef::new("address", "city", Value::Varchar(None)).nullable(),
            ColumnDef::new("address", "state", Value::Varchar(None)).nullable(),
            ColumnDef::new("address", "obsolete", Value::Boolean(None)),
        ])
        .with_relations(vec![RelationDef {
            name: "use",
            kind: RelationKind::ToOne,
            target: concept_def,
            local: "use_concept_id",
            foreign: "id",
        }])
        .with_classifier("use")
        .with_soft_delete("obsolete")
});

static PATIENT: LazyLock<TableDef> = LazyLock::new(|| {
    TableDef::new("patient")
        .with_columns(vec![
            ColumnDef::new("patient", "id", Value::Uuid(None))
                .primary_key()
                .auto_generated(),
            ColumnDef::new("patient", "version", Value::Int32(None)),
            ColumnDef::new("patient", "name", Value::Varchar(None)),
            ColumnDef::new("patient", "dob", Value::Date(None)).nullable(),
            ColumnDef::new("patient", "deceased_time", Value::Timestamp(None)).nullable(),
            ColumnDef::new("patient", "ssn", Value::Varchar(None)).secret().hashed(),
            ColumnDef::new("patient", "type_concept_id", Value::Uuid(None))
                .nullable()
                .always_join()
                .references(ColumnRef::new("concept", "id")),
        ])
        .with_relations(vec![
            RelationDef {
                name: "address",
                kind: RelationKind::ToMany,
                target: address_def,
                local: "id",
                foreign: "patient_id",
            },
            RelationDef {
                name: "typeConcept",
                kind: RelationKind::ToOne,
                target: concept_def,
                local: "type_concept_id",
                foreign: "id",
            },
            RelationDef {
                name: "related",
                kind: RelationKind::ManyToMany {
                    link: link_def,
                    link_local: "patient_id",
                    link_foreign: "related_id",
                },
                target: patient_def,
                local: "id",
                foreign: "id",
            },
        ])
});

static LINK: LazyLock<TableDef> = LazyLock::new(|| {
    TableDef::new("patient_relationship").with_columns(vec![
        ColumnDef::new("patient_relationship", "patient_id", Value::Uuid(None))
            .part_of_primary_key()
            .references(ColumnRef::new("patient", "id")),
        ColumnDef::new("patient_relationship", "related_id", Value::Uuid(None))
            .part_of_primary_key()
            .references(ColumnRef::new("patient", "id")),
    ])
});

pub fn concept_def() -> &'static TableDef {
    &CONCEPT
}

pub fn address_def() -> &'static TableDef {
    &ADDRESS
}

pub fn patient_def() -> &'static TableDef {
    &PATIENT
}

pub fn link_def() -> &'static TableDef {
    &LINK
}

/// Reads a nullable column into `NotSet` when the row carries NULL.
fn optional_field<T: AsValue>(
    row: &RowLabeled,
    table: &TableDef,
    column: &str,
) -> Result<Passive<T>> {
    let value = read_column(row, table, column)?;
    if value.is_null() {
        return Ok(Passive::NotSet);
    }
    Ok(Passive::Loaded(T::try_from_value(value)?))
}

#[derive(Debug, Default, Clone)]
pub struct PatientRow {
    pub id: Passive<Uuid>,
    pub version: Passive<i32>,
    pub name: Passive<String>,
    pub dob: Passive<time::Date>,
    pub deceased_time: Passive<time::PrimitiveDateTime>,
    pub ssn: Passive<String>,
    pub type_concept_id: Passive<Uuid>,
}

impl Entity for PatientRow {
    fn table_def() -> &'static TableDef {
        patient_def()
    }

    fn from_row(row: &RowLabeled) -> Result<Self> {
        let table = patient_def();
        Ok(Self {
            id: read_field(row, table, "id")?,
            version: read_field(row, table, "version")?,
            name: read_field(row, table, "name")?,
            dob: optional_field(row, table, "dob")?,
            deceased_time: optional_field(row, table, "deceased_time")?,
            ssn: optional_field(row, table, "ssn")?,
            type_concept_id: optional_field(row, table, "type_concept_id")?,
        })
    }

    fn row_full(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("id", self.id.as_value()),
            ("version", self.version.as_value()),
            ("name", self.name.as_value()),
            ("dob", self.dob.as_value()),
            ("deceased_time", self.deceased_time.as_value()),
            ("ssn", self.ssn.as_value()),
            ("type_concept_id", self.type_concept_id.as_value()),
        ]
    }

    fn row_dirty(&self) -> Vec<(&'static str, Value)> {
        self.row_full()
            .into_iter()
            .filter(|(name, _)| {
                match *name {
                    "id" => self.id.is_set(),
                    "version" => self.version.is_set(),
                    "name" => self.name.is_set(),
                    "dob" => self.dob.is_set(),
                    "deceased_time" => self.deceased_time.is_set(),
                    "ssn" => self.ssn.is_set(),
                    "type_concept_id" => self.type_concept_id.is_set(),
                    _ => false,
                }
            })
            .collect()
    }

    fn primary_key(&self) -> Vec<Value> {
        vec![self.id.as_value()]
    }

    fn apply_keys(&mut self, keys: &RowLabeled) -> Result<()> {
        if let Some(value) = keys.get("id") {
            self.id = Passive::Loaded(Uuid::try_from_value(value.clone())?);
        }
        Ok(())
    }
}

/// A fully populated patient result row.
pub fn patient_row(id: &str, version: i32, name: &str) -> RowLabeled {
    let labels: Vec<String> = [
        "id",
        "version",
        "name",
        "dob",
        "deceased_time",
        "ssn",
        "type_concept_id",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect();
    let id = Uuid::parse_str(id).unwrap();
    RowLabeled::new(
        labels.into(),
        vec![
            Value::Uuid(Some(id)),
            Value::Int32(Some(version)),
            Value::from(name),
            Value::Date(None),
            Value::Timestamp(None),
            Value::from("123-45-6789"),
            Value::Uuid(None),
        ]
        .into(),
    )
}

pub fn registry() -> TableRegistry {
    TableRegistry::builder()
        .register("Patient", patient_def())
        .register("Address", address_def())
        .register("Concept", concept_def())
        .register("PatientRelationship", link_def())
        .build()
        .unwrap()
}
