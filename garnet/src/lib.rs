mod cache;
mod corelib;
mod dispatch;
mod errno;
mod exceptions;
mod foreign;
mod globals;
mod interop;
mod loader;
mod options;
mod patching;
mod primitives;
mod registry;
mod resolver;
mod runtime;
mod scope;
mod shape;
mod symbols;
mod value;

pub use cache::*;
pub use corelib::*;
pub use dispatch::*;
pub use errno::*;
pub use exceptions::*;
pub use foreign::*;
pub use globals::*;
pub use interop::*;
pub use loader::*;
pub use options::*;
pub use patching::*;
pub use primitives::*;
pub use registry::*;
pub use resolver::*;
pub use runtime::*;
pub use scope::*;
pub use shape::*;
pub use symbols::*;
pub use value::*;
