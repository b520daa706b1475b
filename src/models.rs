//! Data models for the annex dataset.
//!
//! [`Annex`] is the record served by the query engine. [`RemoteEnvelope`] is
//! the outer shape of a successful response from the remote source; only its
//! `items` and `count` are consumed, everything else passes through.

use serde::{Deserialize, Serialize};
use tabula_core::record::{Identified, Record};
use tabula_core::value::Value;

/// One report annex published by the remote source.
///
/// The wire names are the source's (`esfera`, `demonstrativo`, `anexo`).
/// `id` never travels on the wire; it is assigned by position when the
/// dataset is materialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Annex {
    #[serde(default, skip_deserializing)]
    pub id: u64,
    /// Government sphere code (C, E, M, U).
    #[serde(rename = "esfera", default)]
    pub sphere: String,
    /// Statement type (DCA, QDCC).
    #[serde(rename = "demonstrativo", default)]
    pub statement: String,
    #[serde(rename = "anexo", default)]
    pub annex: String,
}

impl Annex {
    pub fn new(sphere: &str, statement: &str, annex: &str) -> Self {
        Self {
            id: 0,
            sphere: sphere.to_string(),
            statement: statement.to_string(),
            annex: annex.to_string(),
        }
    }

    /// Display text, e.g. `E - DCA - Anexo I-C`.
    pub fn label(&self) -> String {
        format!("{} - {} - {}", self.sphere, self.statement, self.annex)
    }

    /// Unique value for selection, e.g. `E|DCA|Anexo I-C`.
    pub fn value(&self) -> String {
        format!("{}|{}|{}", self.sphere, self.statement, self.annex)
    }
}

impl Record for Annex {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name.to_ascii_lowercase().as_str() {
            "id" => Some(self.id.into()),
            "esfera" | "sphere" => Some(self.sphere.as_str().into()),
            "demonstrativo" | "statement" => Some(self.statement.as_str().into()),
            "anexo" | "annex" => Some(self.annex.as_str().into()),
            "label" => Some(self.label().into()),
            "value" => Some(self.value().into()),
            _ => None,
        }
    }
}

impl Identified for Annex {
    fn assign_key(&mut self, key: u64) {
        self.id = key;
    }
}

/// Number annexes 1..=n in dataset order.
pub fn assign_ids(annexes: &mut [Annex]) {
    for (i, annex) in annexes.iter_mut().enumerate() {
        annex.id = i as u64 + 1;
    }
}

/// A value/text pair for a selection widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
}

impl From<&Annex> for SelectOption {
    fn from(annex: &Annex) -> Self {
        Self {
            value: annex.value(),
            text: annex.label(),
        }
    }
}

/// Decoded body of a successful response.
///
/// Field names here are lowercase; [`crate::envelope::decode_envelope`]
/// folds the wire keys before deserializing.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "I: Deserialize<'de>"))]
pub struct RemoteEnvelope<I> {
    #[serde(default = "Vec::new", deserialize_with = "null_as_empty")]
    pub items: Vec<I>,
    #[serde(rename = "hasmore", default)]
    pub has_more: bool,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub rel: String,
    #[serde(default)]
    pub href: String,
}

fn null_as_empty<'de, D, I>(deserializer: D) -> Result<Vec<I>, D::Error>
where
    D: serde::Deserializer<'de>,
    I: Deserialize<'de>,
{
    Ok(Option::<Vec<I>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_and_value() {
        let a = Annex::new("E", "DCA", "Anexo I-C");
        assert_eq!(a.label(), "E - DCA - Anexo I-C");
        assert_eq!(a.value(), "E|DCA|Anexo I-C");

        let option = SelectOption::from(&a);
        assert_eq!(option.value, "E|DCA|Anexo I-C");
        assert_eq!(option.text, "E - DCA - Anexo I-C");
    }

    #[test]
    fn test_fields_by_either_name() {
        let mut a = Annex::new("M", "QDCC", "RGF-Anexo 01");
        a.assign_key(4);
        assert_eq!(a.field("ID"), Some(Value::Int(4)));
        assert_eq!(a.field("Esfera"), Some(Value::Text("M".into())));
        assert_eq!(a.field("sphere"), a.field("esfera"));
        assert_eq!(a.field("statement"), Some(Value::Text("QDCC".into())));
        assert_eq!(a.field("label"), Some(Value::Text("M - QDCC - RGF-Anexo 01".into())));
        assert_eq!(a.field("hobby"), None);
    }

    #[test]
    fn test_assign_ids_is_positional() {
        let mut rows = vec![
            Annex::new("C", "QDCC", "RGF-Anexo 01"),
            Annex::new("E", "DCA", "Anexo I-AB"),
            Annex::new("U", "DCA", "DCA-Anexo I-C"),
        ];
        assign_ids(&mut rows);
        let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_id_is_not_read_from_the_wire() {
        let a: Annex =
            serde_json::from_str(r#"{"id": 99, "esfera": "E", "demonstrativo": "DCA", "anexo": "x"}"#)
                .unwrap();
        assert_eq!(a.id, 0);
        assert_eq!(a.sphere, "E");
    }
}
