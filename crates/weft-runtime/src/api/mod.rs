//! Public embedding API
//!
//! - [`Runtime`]: evaluates trees, keeps globals between evaluations
//! - Host functions: plain closures, suspending closures, or
//!   [`HostFunctionBuilder`] for arity-checked ones
//! - Value conversion between Rust and Weft types
//!
//! # Examples
//!
//! ```
//! use weft_runtime::api::{HostFunctionBuilder, Runtime};
//! use weft_runtime::node::build::*;
//! use weft_runtime::Value;
//!
//! let mut runtime = Runtime::new();
//! let square = HostFunctionBuilder::new("square")
//!     .with_arity(1)
//!     .with_implementation(|args| match &args[0] {
//!         Value::Int(n) => Ok(Value::Int(n * n)),
//!         _ => Ok(Value::Null),
//!     })
//!     .build()
//!     .unwrap();
//! runtime.register(square);
//!
//! let result = runtime.evaluate(&call("square", vec![int(9)])).unwrap();
//! assert_eq!(result, Value::Int(81));
//! ```

pub mod conversion;
pub mod native;
pub mod runtime;

pub use conversion::{ConversionError, FromValue, ToValue};
pub use native::{BuildError, HostFunctionBuilder};
pub use runtime::{evaluate, Runtime};
