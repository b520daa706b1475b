//! Shared fixture record for unit tests.

use chrono::{NaiveDate, NaiveDateTime};

use crate::record::{Identified, Record};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Staff {
    pub id: u64,
    pub name: String,
    pub count: i64,
    pub hired: NaiveDateTime,
    pub hobbies: Vec<String>,
}

pub fn staff(id: u64, name: &str, count: i64, hobbies: &[&str]) -> Staff {
    let hired = NaiveDate::from_ymd_opt(2021, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
        + chrono::Duration::days(id as i64);
    Staff {
        id,
        name: name.to_string(),
        count,
        hired,
        hobbies: hobbies.iter().map(|h| h.to_string()).collect(),
    }
}

impl Record for Staff {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name.to_ascii_lowercase().as_str() {
            "id" => Some(self.id.into()),
            "name" => Some(self.name.clone().into()),
            "count" => Some(self.count.into()),
            "hired" => Some(self.hired.into()),
            "hobbies" => Some(self.hobbies.clone().into()),
            _ => None,
        }
    }
}

impl Identified for Staff {
    fn assign_key(&mut self, key: u64) {
        self.id = key;
    }
}
