use crate::{
    AsValue, EncryptionProvider, Entity, Error, Record, Result, RowLabeled, TableDef, Value,
};
use log::warn;

/// Reads one named column from a labeled row, raising `MissingField` when
/// the result does not carry it. Entity `from_row` implementations build on
/// this.
pub fn read_column(row: &RowLabeled, table: &TableDef, column: &str) -> Result<Value> {
    row.get(column)
        .cloned()
        .ok_or_else(|| Error::missing_field(table.name(), column))
}

/// Typed variant of [`read_column`], converting into the field type.
pub fn read_field<T: AsValue>(row: &RowLabeled, table: &TableDef, column: &str) -> Result<T> {
    let value = read_column(row, table, column)?;
    T::try_from_value(value).map_err(|error| Error::MissingField {
        table: table.name().to_owned(),
        column: column.to_owned(),
        source: Some(anyhow::Error::msg(error.to_string())),
    })
}

/// Row-to-object marshalling, branching on the destination type category:
/// mapped entity, scalar, dynamic record or positional composite tuple.
pub struct Marshaller<'a> {
    encryption: Option<&'a dyn EncryptionProvider>,
}

impl<'a> Marshaller<'a> {
    pub fn new(encryption: Option<&'a dyn EncryptionProvider>) -> Self {
        Self { encryption }
    }

    /// Materializes a mapped entity. Secret columns are blanked before the
    /// entity sees the row; encrypted columns are decrypted when the value
    /// carries the provider's ciphertext marker.
    pub fn entity<E: Entity>(&self, row: &RowLabeled) -> Result<E> {
        let table = E::table_def();
        E::from_row(&self.prepare(table, row))
    }

    fn prepare(&self, table: &TableDef, row: &RowLabeled) -> RowLabeled {
        let mut values = row.values.to_vec();
        for (i, label) in row.labels.iter().enumerate() {
            let Some(column) = table
                .columns
                .iter()
                .find(|c| c.name().eq_ignore_ascii_case(label))
            else {
                continue;
            };
            if column.secret {
                values[i] = column.value.as_empty();
            } else if column.encrypt_id.is_some() {
                values[i] = self.decrypted(values[i].clone());
            }
        }
        RowLabeled::new(row.labels.clone(), values.into())
    }

    fn decrypted(&self, value: Value) -> Value {
        let Some(provider) = self.encryption else {
            return value;
        };
        if !provider.has_encryption_magic(&value) {
            return value;
        }
        // A value that does not decrypt is kept as-is.
        provider.try_decrypt(&value).unwrap_or(value)
    }

    /// Reads column 0 as a scalar, converting as needed; NULL becomes the
    /// type default for optional destinations.
    pub fn scalar<T: AsValue>(&self, row: &RowLabeled) -> Result<T> {
        let value = row.values.first().cloned().unwrap_or(Value::Null);
        let converted = value.try_convert(&T::as_empty_value())?;
        T::try_from_value(converted)
    }

    /// Builds a dynamic record from every result column: lower-cased names
    /// in result order, decrypting marked ciphertext, duplicates collapsed
    /// last-write-wins with a warning.
    pub fn record(&self, row: &RowLabeled) -> Record {
        let mut record = Record::new();
        for (i, label) in row.labels.iter().enumerate() {
            let value = self.decrypted(row.values[i].clone());
            if !record.insert(label, value) {
                warn!("duplicate result column `{}`, keeping the last value", label);
            }
        }
        record
    }

    fn window(&self, row: &RowLabeled, offset: usize, table: &TableDef) -> Result<RowLabeled> {
        let len = table.columns.len();
        if offset + len > row.labels.len() {
            return Err(Error::missing_field(
                table.name(),
                table
                    .columns
                    .get(row.labels.len().saturating_sub(offset))
                    .map(|c| c.name())
                    .unwrap_or("<row too narrow>"),
            ));
        }
        Ok(RowLabeled::new(
            row.labels[offset..offset + len].to_vec().into(),
            row.values[offset..offset + len].to_vec().into(),
        ))
    }

    /// Reads two independently mapped sub-objects positionally from one
    /// joined row.
    pub fn composite2<A: Entity, B: Entity>(&self, row: &RowLabeled) -> Result<(A, B)> {
        let a = self.entity::<A>(&self.window(row, 0, A::table_def())?)?;
        let b = self.entity::<B>(&self.window(row, A::table_def().columns.len(), B::table_def())?)?;
        Ok((a, b))
    }

    pub fn composite3<A: Entity, B: Entity, C: Entity>(
        &self,
        row: &RowLabeled,
    ) -> Result<(A, B, C)> {
        let (a, b) = self.composite2::<A, B>(row)?;
        let offset = A::table_def().columns.len() + B::table_def().columns.len();
        let c = self.entity::<C>(&self.window(row, offset, C::table_def())?)?;
        Ok((a, b, c))
    }

    pub fn composite4<A: Entity, B: Entity, C: Entity, D: Entity>(
        &self,
        row: &RowLabeled,
    ) -> Result<(A, B, C, D)> {
        let (a, b, c) = self.composite3::<A, B, C>(row)?;
        let offset = A::table_def().columns.len()
            + B::table_def().columns.len()
            + C::table_def().columns.len();
        let d = self.entity::<D>(&self.window(row, offset, D::table_def())?)?;
        Ok((a, b, c, d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{patient_row, PatientRow};
    use crate::EncryptionMode;
    use std::sync::Arc;

    #[test]
    fn entity_round_trip_blanks_secret_columns() {
        let marshaller = Marshaller::new(None);
        let row = patient_row("11111111-2222-3333-4444-555555555555", 3, "smith");
        let patient: PatientRow = marshaller.entity(&row).unwrap();
        assert_eq!(patient.name.get().map(String::as_str), Some("smith"));
        assert_eq!(patient.version.get(), Some(&3));
        // ssn is secret: never populated from a read
        assert!(patient.ssn.get().is_none());
    }

    #[test]
    fn missing_column_names_table_and_column() {
        let marshaller = Marshaller::new(None);
        let row = RowLabeled::new(
            Arc::from(vec!["id".to_owned()]),
            vec![Value::Uuid(Some(uuid::Uuid::nil()))].into(),
        );
        let err = marshaller.entity::<PatientRow>(&row).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingField { table, column, .. }
                if table == "patient" && column == "version"
        ));
    }

    #[test]
    fn scalar_converts_column_zero() {
        let marshaller = Marshaller::new(None);
        let row = RowLabeled::new(
            Arc::from(vec!["count".to_owned()]),
            vec![Value::Int64(Some(42))].into(),
        );
        let count: i32 = marshaller.scalar(&row).unwrap();
        assert_eq!(count, 42);
    }

    #[test]
    fn scalar_null_becomes_default_for_optionals() {
        let marshaller = Marshaller::new(None);
        let row = RowLabeled::new(
            Arc::from(vec!["name".to_owned()]),
            vec![Value::Varchar(None)].into(),
        );
        let name: Option<String> = marshaller.scalar(&row).unwrap();
        assert_eq!(name, None);
    }

    #[test]
    fn record_lower_cases_and_decrypts() {
        struct Rot;
        impl EncryptionProvider for Rot {
            fn mode(&self, _: &str) -> Option<EncryptionMode> {
                Some(EncryptionMode::Deterministic)
            }
            fn encrypt(&self, _: EncryptionMode, value: &Value) -> Result<Value> {
                Ok(value.clone())
            }
            fn try_decrypt(&self, value: &Value) -> Option<Value> {
                match value {
                    Value::Varchar(Some(v)) => Some(Value::Varchar(Some(
                        v.strip_prefix("enc:").unwrap_or(v).to_owned(),
                    ))),
                    _ => None,
                }
            }
            fn has_encryption_magic(&self, value: &Value) -> bool {
                matches!(value, Value::Varchar(Some(v)) if v.starts_with("enc:"))
            }
        }
        let provider = Rot;
        let marshaller = Marshaller::new(Some(&provider));
        let row = RowLabeled::new(
            Arc::from(vec!["Id".to_owned(), "Secret".to_owned()]),
            vec![Value::Int32(Some(1)), Value::from("enc:hunter2")].into(),
        );
        let record = marshaller.record(&row);
        assert_eq!(record.get("id"), Some(&Value::Int32(Some(1))));
        assert_eq!(record.get("secret"), Some(&Value::from("hunter2")));
    }

    #[test]
    fn composite_reads_positionally() {
        let marshaller = Marshaller::new(None);
        let left = patient_row("11111111-2222-3333-4444-555555555555", 1, "smith");
        let right = patient_row("99999999-8888-7777-6666-555555555555", 2, "jones");
        let labels: Vec<String> = left
            .labels
            .iter()
            .chain(right.labels.iter())
            .cloned()
            .collect();
        let values: Vec<Value> = left
            .values
            .iter()
            .chain(right.values.iter())
            .cloned()
            .collect();
        let row = RowLabeled::new(labels.into(), values.into());
        let (a, b): (PatientRow, PatientRow) = marshaller.composite2(&row).unwrap();
        assert_eq!(a.name.get().map(String::as_str), Some("smith"));
        assert_eq!(b.name.get().map(String::as_str), Some("jones"));
    }
}
