//! Message codec: body, content type, properties, delivery annotations, TTL.
//!
//! The messenger only reads the address and writes the tracker and link
//! address; everything else is carried opaquely between peers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::delivery::Tracker;

/// Typed value for application properties and annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Binary(Vec<u8>),
    String(String),
    Symbol(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Int(_) => "int32",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Binary(_) => "binary",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Body {
    #[default]
    Empty,
    Text(String),
    Binary(Vec<u8>),
}

impl Body {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Body::Empty => &[],
            Body::Text(s) => s.as_bytes(),
            Body::Binary(b) => b,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Body::Text(_))
    }
}

/// Annotation value surfaced by [`Message::delivery_annotations`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationValue {
    Symbol(String),
    String(String),
    Int(i32),
}

/// A delivery annotation with a symbol key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAnnotation {
    pub key: String,
    pub key_type: &'static str,
    pub value: AnnotationValue,
    pub value_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    address: String,
    content_type: String,
    body: Body,
    ttl: u32,
    properties: IndexMap<String, Value>,
    annotations: Vec<(Value, Value)>,
    #[serde(skip)]
    link_address: Option<String>,
    #[serde(skip)]
    tracker: Option<Tracker>,
}

impl Message {
    pub fn new(address: impl Into<String>, body: Body) -> Self {
        Self {
            address: address.into(),
            body,
            ..Default::default()
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn set_address(&mut self, address: impl Into<String>) {
        self.address = address.into();
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = content_type.into();
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Text bodies default the content type to `text/plain` when none is set.
    pub fn set_body(&mut self, body: Body) {
        if body.is_text() && self.content_type.is_empty() {
            self.content_type = "text/plain".to_string();
        }
        self.body = body;
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Milliseconds; values above `u32::MAX` are clamped, negatives become 0.
    pub fn set_ttl(&mut self, ttl: i64) {
        self.ttl = ttl.clamp(0, u32::MAX as i64) as u32;
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut IndexMap<String, Value> {
        &mut self.properties
    }

    pub fn set_properties(&mut self, properties: IndexMap<String, Value>) {
        self.properties = properties;
    }

    /// Raw annotation entries, any key or value type.
    pub fn set_raw_annotations(&mut self, annotations: Vec<(Value, Value)>) {
        self.annotations = annotations;
    }

    /// Symbol-keyed annotations whose values are symbol, string or int32.
    /// `None` when nothing qualifies.
    pub fn delivery_annotations(&self) -> Option<Vec<DeliveryAnnotation>> {
        let out: Vec<DeliveryAnnotation> = self
            .annotations
            .iter()
            .filter_map(|(k, v)| {
                let Value::Symbol(key) = k else {
                    return None;
                };
                let value = match v {
                    Value::Symbol(s) => AnnotationValue::Symbol(s.clone()),
                    Value::String(s) => AnnotationValue::String(s.clone()),
                    Value::Int(i) => AnnotationValue::Int(*i),
                    _ => return None,
                };
                Some(DeliveryAnnotation {
                    key: key.clone(),
                    key_type: "symbol",
                    value,
                    value_type: v.type_name(),
                })
            })
            .collect();
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }

    /// Remote source address of the link the message arrived on.
    pub fn link_address(&self) -> Option<&str> {
        self.link_address.as_deref()
    }

    pub(crate) fn set_link_address(&mut self, address: Option<String>) {
        self.link_address = address;
    }

    /// Delivery handle assigned by put or receive.
    pub fn tracker(&self) -> Option<Tracker> {
        self.tracker
    }

    pub(crate) fn set_tracker(&mut self, tracker: Tracker) {
        self.tracker = Some(tracker);
    }
}
