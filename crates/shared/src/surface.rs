use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::{
    error::RemoteError,
    protocol::{RemoteRequest, RemoteResponse},
};

/// Positional and keyword arguments of a method call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl CallArgs {
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self { args, kwargs }
    }

    /// Looks the argument up by keyword first, then by position.
    pub fn get<T: DeserializeOwned>(&self, index: usize, keyword: &str) -> Result<T, RemoteError> {
        let raw = self
            .kwargs
            .get(keyword)
            .or_else(|| self.args.get(index))
            .ok_or_else(|| {
                RemoteError::invalid_arguments(format!(
                    "missing argument '{keyword}' (position {index})"
                ))
            })?;
        serde_json::from_value(raw.clone()).map_err(|err| {
            RemoteError::invalid_arguments(format!("argument '{keyword}' is malformed: {err}"))
        })
    }

    pub fn len(&self) -> usize {
        self.args.len() + self.kwargs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Implemented by whatever a remote client drives: the live runtime, or a stub
/// in tests.
pub trait RemoteSurface {
    fn call_method(&mut self, name: &str, args: &CallArgs) -> Result<Value, RemoteError>;

    fn read_attribute(&mut self, name: &str) -> Result<Value, RemoteError>;
}

/// Runs one request against the surface. Failures become a carried error so
/// the channel always answers exactly once.
pub fn execute(surface: &mut dyn RemoteSurface, request: RemoteRequest) -> RemoteResponse {
    let outcome = match request {
        RemoteRequest::MethodCall { name, args, kwargs } => {
            surface.call_method(&name, &CallArgs::new(args, kwargs))
        }
        RemoteRequest::AttributeAccess { name } => surface.read_attribute(&name),
    };
    match outcome {
        Ok(value) => RemoteResponse::Value(value),
        Err(err) => RemoteResponse::CarriedError(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    struct Adder;

    impl RemoteSurface for Adder {
        fn call_method(&mut self, name: &str, args: &CallArgs) -> Result<Value, RemoteError> {
            match name {
                "add" => {
                    let a: i64 = args.get(0, "a")?;
                    let b: i64 = args.get(1, "b")?;
                    Ok(json!(a + b))
                }
                other => Err(RemoteError::unknown_method(other)),
            }
        }

        fn read_attribute(&mut self, name: &str) -> Result<Value, RemoteError> {
            Err(RemoteError::unknown_attribute(name))
        }
    }

    #[test]
    fn keyword_arguments_take_precedence() {
        let mut kwargs = Map::new();
        kwargs.insert("b".into(), json!(10));
        let response = execute(
            &mut Adder,
            RemoteRequest::method_call_with_kwargs("add", vec![json!(1), json!(2)], kwargs),
        );
        assert_eq!(response, RemoteResponse::Value(json!(11)));
    }

    #[test]
    fn failures_are_carried_instead_of_raised() {
        let response = execute(&mut Adder, RemoteRequest::method_call("sub", vec![]));
        match response {
            RemoteResponse::CarriedError(err) => assert_eq!(err.code, ErrorCode::UnknownMethod),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn malformed_argument_is_invalid() {
        let response = execute(
            &mut Adder,
            RemoteRequest::method_call("add", vec![json!("two"), json!(3)]),
        );
        match response {
            RemoteResponse::CarriedError(err) => {
                assert_eq!(err.code, ErrorCode::InvalidArguments)
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
