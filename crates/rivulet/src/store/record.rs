use super::{Document, ObjectId};
use crate::{Error, Result};
use core::fmt;
use serde::{Deserialize, Serialize};

/// The caller-supplied fields of a record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    pub author_id: String,
    pub title: String,
    pub content: String,
}

impl RecordFields {
    /// Storage form without an identifier, ready for insertion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if translation fails.
    pub fn to_document(&self) -> Result<Document> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A stored record: its identifier plus its fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    #[serde(flatten)]
    pub fields: RecordFields,
}

impl Record {
    pub const fn new(id: ObjectId, fields: RecordFields) -> Self {
        Self { id, fields }
    }

    /// # Errors
    ///
    /// Returns [`Error::Internal`] if translation fails.
    pub fn to_document(&self) -> Result<Document> {
        Ok(serde_json::to_value(self)?)
    }

    /// Translates a storage document into a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the document is missing a field or holds
    /// one of the wrong type.
    pub fn from_document(doc: Document) -> Result<Self> {
        serde_json::from_value(doc).map_err(Error::from)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id:{:?} author_id:{:?} title:{:?} content:{:?}",
            self.id.to_string(),
            self.fields.author_id,
            self.fields.title,
            self.fields.content
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Record {
        Record::new(
            ObjectId::parse("507f1f77bcf86cd799439011").unwrap(),
            RecordFields {
                author_id: "ada".into(),
                title: "Engines".into(),
                content: "Notes on the analytical engine".into(),
            },
        )
    }

    #[test]
    fn document_layout_is_flat_with_underscore_id() {
        assert_eq!(
            sample().to_document().unwrap(),
            json!({
                "_id": "507f1f77bcf86cd799439011",
                "author_id": "ada",
                "title": "Engines",
                "content": "Notes on the analytical engine",
            })
        );
        assert_eq!(
            Record::from_document(sample().to_document().unwrap()),
            Ok(sample())
        );
    }

    #[test]
    fn malformed_document_is_internal() {
        let err = Record::from_document(json!({ "_id": "507f1f77bcf86cd799439011", "title": 3 }))
            .unwrap_err();
        assert!(matches!(err, Error::Internal { .. }), "{err}");

        let err = Record::from_document(json!({ "_id": "zz", "author_id": "", "title": "", "content": "" }))
            .unwrap_err();
        assert!(matches!(err, Error::Internal { .. }), "{err}");
    }

    #[test]
    fn display_quotes_every_field() {
        assert_eq!(
            sample().to_string(),
            r#"id:"507f1f77bcf86cd799439011" author_id:"ada" title:"Engines" content:"Notes on the analytical engine""#
        );
    }
}
