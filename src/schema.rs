//! Method schema: method id → type-erased body constructors.
//!
//! The schema is the single source of truth for what each method's bodies
//! look like. Typed entry points (request wrappers, handler registration)
//! monomorphize decode functions and erase them behind plain `fn` pointers,
//! so the dispatch core stays free of generics while registration keeps
//! compile-time types.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::codec::MsgPackCodec;
use crate::error::Result;

/// A decoded body value, type-erased. Typed wrappers downcast it back to
/// the concrete type the schema declared.
pub type BoxedValue = Box<dyn Any + Send>;

/// Monomorphized decode entry point stored in descriptors.
pub(crate) type DecodeFn = fn(&[u8]) -> Result<BoxedValue>;

fn decode_as<T>(body: &[u8]) -> Result<BoxedValue>
where
    T: DeserializeOwned + Send + 'static,
{
    Ok(Box::new(MsgPackCodec::decode::<T>(body)?))
}

/// Body constructors for one method.
///
/// The absence of a response constructor declares the method void-response:
/// its Response frames carry an empty body and callers resolve to `None`.
pub struct MethodDescriptor {
    pub(crate) decode_request: DecodeFn,
    pub(crate) decode_response: Option<DecodeFn>,
    pub(crate) request_type: TypeId,
    pub(crate) response_type: Option<TypeId>,
}

impl MethodDescriptor {
    /// Descriptor for a method with a response body.
    pub fn new<Req, Res>() -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: DeserializeOwned + Send + 'static,
    {
        Self {
            decode_request: decode_as::<Req>,
            decode_response: Some(decode_as::<Res>),
            request_type: TypeId::of::<Req>(),
            response_type: Some(TypeId::of::<Res>()),
        }
    }

    /// Descriptor for a void-response method.
    pub fn void<Req>() -> Self
    where
        Req: DeserializeOwned + Send + 'static,
    {
        Self {
            decode_request: decode_as::<Req>,
            decode_response: None,
            request_type: TypeId::of::<Req>(),
            response_type: None,
        }
    }

    /// Whether the method declares a response body.
    pub fn responds(&self) -> bool {
        self.decode_response.is_some()
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("responds", &self.responds())
            .finish()
    }
}

/// Mapping from method id to descriptor. Immutable once handed to a peer.
#[derive(Debug, Default)]
pub struct Schema {
    methods: HashMap<u16, MethodDescriptor>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a method with request and response bodies.
    pub fn method<Req, Res>(mut self, id: u16) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
        Res: DeserializeOwned + Send + 'static,
    {
        self.methods.insert(id, MethodDescriptor::new::<Req, Res>());
        self
    }

    /// Declare a method whose response is void.
    pub fn void_method<Req>(mut self, id: u16) -> Self
    where
        Req: DeserializeOwned + Send + 'static,
    {
        self.methods.insert(id, MethodDescriptor::void::<Req>());
        self
    }

    /// Get the descriptor for a method id.
    pub fn descriptor(&self, id: u16) -> Option<&MethodDescriptor> {
        self.methods.get(&id)
    }

    /// Whether the schema declares the method id.
    pub fn contains(&self, id: u16) -> bool {
        self.methods.contains_key(&id)
    }

    /// Number of declared methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether the schema declares no methods.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct EchoParams {
        text: String,
    }

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct EchoResult {
        text: String,
    }

    fn schema() -> Schema {
        Schema::new()
            .method::<EchoParams, EchoResult>(1)
            .void_method::<EchoParams>(2)
    }

    #[test]
    fn test_descriptor_lookup() {
        let schema = schema();

        assert!(schema.contains(1));
        assert!(schema.contains(2));
        assert!(!schema.contains(3));
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_responds() {
        let schema = schema();

        assert!(schema.descriptor(1).unwrap().responds());
        assert!(!schema.descriptor(2).unwrap().responds());
    }

    #[test]
    fn test_decode_request_produces_downcastable_value() {
        let schema = schema();
        let body = MsgPackCodec::encode(&EchoParams {
            text: "hi".to_string(),
        })
        .unwrap();

        let decoded = (schema.descriptor(1).unwrap().decode_request)(&body).unwrap();
        let params = decoded.downcast::<EchoParams>().unwrap();
        assert_eq!(params.text, "hi");
    }

    #[test]
    fn test_decode_request_failure_surfaces_decoder_error() {
        let schema = schema();
        let err = (schema.descriptor(1).unwrap().decode_request)(b"\xc1").unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_redeclaring_a_method_overwrites() {
        let schema = Schema::new()
            .method::<EchoParams, EchoResult>(1)
            .void_method::<EchoParams>(1);

        assert_eq!(schema.len(), 1);
        assert!(!schema.descriptor(1).unwrap().responds());
    }
}
