//! Conversions between wire messages and engine types.
//!
//! Message fields are optional in proto3. A missing `greeting` or `blog` reads
//! as all-empty strings, so a request without one behaves like a request with
//! blank fields: a blank blog id fails id parsing, a blank greeting greets
//! nobody.

use crate::proto::{blog, greet};
use rivulet::{
    handler::greeting::Greeting,
    store::{Record, RecordFields},
};

impl From<greet::Greeting> for Greeting {
    fn from(value: greet::Greeting) -> Self {
        Self::new(value.first_name, value.last_name)
    }
}

impl From<Greeting> for greet::Greeting {
    fn from(value: Greeting) -> Self {
        Self {
            first_name: value.first_name,
            last_name: value.last_name,
        }
    }
}

/// The greeting carried by a request, blank if absent.
pub fn greeting(value: Option<greet::Greeting>) -> Greeting {
    value.map(Greeting::from).unwrap_or_default()
}

impl From<Record> for blog::Blog {
    fn from(record: Record) -> Self {
        Self {
            id: record.id.to_string(),
            author_id: record.fields.author_id,
            title: record.fields.title,
            content: record.fields.content,
        }
    }
}

impl From<blog::Blog> for RecordFields {
    fn from(value: blog::Blog) -> Self {
        Self {
            author_id: value.author_id,
            title: value.title,
            content: value.content,
        }
    }
}

/// Splits a blog into its raw id and its fields, blank if absent.
///
/// The id is left unparsed so the record handlers can reject it with their
/// own message.
pub fn split_blog(value: Option<blog::Blog>) -> (String, RecordFields) {
    let mut value = value.unwrap_or_default();
    let id = core::mem::take(&mut value.id);
    (id, value.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet::store::ObjectId;

    #[test]
    fn missing_greeting_is_blank() {
        assert_eq!(greeting(None), Greeting::default());
        let named = greet::Greeting {
            first_name: "Jane".into(),
            last_name: "Doe".into(),
        };
        assert_eq!(greeting(Some(named)), Greeting::new("Jane", "Doe"));
    }

    #[test]
    fn record_round_trips_through_blog() {
        let id = ObjectId::generate();
        let fields = RecordFields {
            author_id: "ada".into(),
            title: "Engines".into(),
            content: "Notes".into(),
        };
        let blog = blog::Blog::from(Record::new(id, fields.clone()));
        assert_eq!(blog.id, id.to_string());

        let (raw_id, back) = split_blog(Some(blog));
        assert_eq!(raw_id, id.to_string());
        assert_eq!(back, fields);
    }

    #[test]
    fn missing_blog_splits_into_blanks() {
        let (id, fields) = split_blog(None);
        assert!(id.is_empty());
        assert_eq!(fields, RecordFields::default());
    }
}
