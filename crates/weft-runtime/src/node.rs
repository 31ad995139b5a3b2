//! Expression tree consumed by the dispatcher
//!
//! Nodes come from an external parser. Children are shared `Arc`s so
//! instructions can carry sub-trees around without copying them. The
//! [`build`] module has terse constructors for embedders and tests.

use crate::value::Value;
use std::sync::Arc;

pub type NodeRef = Arc<Node>;

/// Parsed expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Literal(Value),
    Ident(Arc<str>),
    /// List literal, evaluates every item
    List(Arc<[NodeRef]>),
    /// Map literal with string keys, evaluates every value
    Map(Arc<[(Arc<str>, NodeRef)]>),
    Lambda {
        params: Arc<[Arc<str>]>,
        body: Arc<[NodeRef]>,
    },
    /// Sequence evaluating to its last item (Null when empty)
    Block(Arc<[NodeRef]>),
    /// Application, or a macro form when `head` names a registered keyword
    Call { head: NodeRef, args: Arc<[NodeRef]> },
    Member { object: NodeRef, name: Arc<str> },
    Index { target: NodeRef, index: NodeRef },
}

impl Node {
    /// Identifier name, if this node is one
    pub fn as_ident(&self) -> Option<&Arc<str>> {
        match self {
            Node::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Short description for tape dumps
    pub fn summary(&self) -> String {
        match self {
            Node::Literal(v) => v.to_string(),
            Node::Ident(name) => name.to_string(),
            Node::List(items) => format!("[list of {}]", items.len()),
            Node::Map(entries) => format!("{{map of {}}}", entries.len()),
            Node::Lambda { params, .. } => format!("(fn [{}])", params.join(" ")),
            Node::Block(items) => format!("(block of {})", items.len()),
            Node::Call { head, args } => match head.as_ref() {
                Node::Ident(name) => format!("({} ...{})", name, args.len()),
                _ => format!("(<expr> ...{})", args.len()),
            },
            Node::Member { name, .. } => format!("<expr>.{}", name),
            Node::Index { .. } => "<expr>[<expr>]".to_string(),
        }
    }
}

/// Tree constructors
pub mod build {
    use super::{Node, NodeRef};
    use crate::value::Value;
    use std::sync::Arc;

    pub fn null() -> NodeRef {
        Arc::new(Node::Literal(Value::Null))
    }

    pub fn boolean(b: bool) -> NodeRef {
        Arc::new(Node::Literal(Value::Bool(b)))
    }

    pub fn int(n: i64) -> NodeRef {
        Arc::new(Node::Literal(Value::Int(n)))
    }

    pub fn float(n: f64) -> NodeRef {
        Arc::new(Node::Literal(Value::Float(n)))
    }

    pub fn string(s: &str) -> NodeRef {
        Arc::new(Node::Literal(Value::string(s)))
    }

    pub fn literal(value: Value) -> NodeRef {
        Arc::new(Node::Literal(value))
    }

    pub fn ident(name: &str) -> NodeRef {
        Arc::new(Node::Ident(name.into()))
    }

    pub fn list(items: Vec<NodeRef>) -> NodeRef {
        Arc::new(Node::List(items.into()))
    }

    pub fn map(entries: Vec<(&str, NodeRef)>) -> NodeRef {
        let entries: Vec<(Arc<str>, NodeRef)> =
            entries.into_iter().map(|(k, v)| (Arc::from(k), v)).collect();
        Arc::new(Node::Map(entries.into()))
    }

    pub fn lambda(params: &[&str], body: Vec<NodeRef>) -> NodeRef {
        let params: Vec<Arc<str>> = params.iter().map(|p| Arc::from(*p)).collect();
        Arc::new(Node::Lambda {
            params: params.into(),
            body: body.into(),
        })
    }

    pub fn block(items: Vec<NodeRef>) -> NodeRef {
        Arc::new(Node::Block(items.into()))
    }

    /// Call whose head is an identifier (function name or macro keyword)
    pub fn call(head: &str, args: Vec<NodeRef>) -> NodeRef {
        call_expr(ident(head), args)
    }

    /// Call whose head is an arbitrary expression
    pub fn call_expr(head: NodeRef, args: Vec<NodeRef>) -> NodeRef {
        Arc::new(Node::Call {
            head,
            args: args.into(),
        })
    }

    pub fn member(object: NodeRef, name: &str) -> NodeRef {
        Arc::new(Node::Member {
            object,
            name: name.into(),
        })
    }

    /// `object.name(args...)`
    pub fn method(object: NodeRef, name: &str, args: Vec<NodeRef>) -> NodeRef {
        call_expr(member(object, name), args)
    }

    pub fn index(target: NodeRef, index: NodeRef) -> NodeRef {
        Arc::new(Node::Index { target, index })
    }
}
