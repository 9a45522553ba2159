//! Managed-runtime terms
//!
//! `Term` is the value type that crosses between native code and the managed
//! runtime. All variants own their data, so cloning a term is a deep copy;
//! the only shared pieces are resource tokens and process identifiers, which
//! are references by nature.

use crate::mailbox::Pid;
use crate::resource::ResourceTerm;
use std::borrow::Cow;
use std::fmt;

/// Interned-style symbolic constant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Atom(Cow<'static, str>);

impl Atom {
    /// Atom backed by a static string
    pub const fn from_static(name: &'static str) -> Self {
        Atom(Cow::Borrowed(name))
    }

    /// Atom from an owned name
    pub fn new(name: impl Into<String>) -> Self {
        Atom(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known atoms
pub mod atoms {
    use super::Atom;

    pub const OK: Atom = Atom::from_static("ok");
    pub const ERROR: Atom = Atom::from_static("error");
    pub const NIL: Atom = Atom::from_static("nil");
    pub const ENOMEM: Atom = Atom::from_static("enomem");
    pub const BADARG: Atom = Atom::from_static("badarg");
    pub const TRUE: Atom = Atom::from_static("true");
    pub const FALSE: Atom = Atom::from_static("false");
}

/// Reference to a function the managed runtime knows how to evaluate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunRef {
    pub name: String,
    pub arity: usize,
}

impl FunRef {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

/// Managed-runtime value
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Signed integer
    Integer(i64),
    /// IEEE 754 double
    Float(f64),
    /// Symbolic constant
    Atom(Atom),
    /// Raw byte buffer
    Binary(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// Proper list
    List(Vec<Term>),
    /// Fixed-size tuple
    Tuple(Vec<Term>),
    /// Mailbox identity
    Pid(Pid),
    /// Function reference
    Fun(FunRef),
    /// Opaque token for a native resource
    Resource(ResourceTerm),
}

impl Term {
    pub fn atom(name: &str) -> Self {
        Term::Atom(Atom::new(name))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Term::String(s.into())
    }

    pub fn tuple(items: Vec<Term>) -> Self {
        Term::Tuple(items)
    }

    pub fn list(items: Vec<Term>) -> Self {
        Term::List(items)
    }

    pub fn fun(name: impl Into<String>, arity: usize) -> Self {
        Term::Fun(FunRef::new(name, arity))
    }

    /// `{ok, Value}`
    pub fn ok(value: Term) -> Self {
        Term::Tuple(vec![Term::Atom(atoms::OK), value])
    }

    /// `{error, Reason}`
    pub fn error(reason: Term) -> Self {
        Term::Tuple(vec![Term::Atom(atoms::ERROR), reason])
    }

    pub fn nil() -> Self {
        Term::Atom(atoms::NIL)
    }

    pub fn badarg() -> Self {
        Term::Atom(atoms::BADARG)
    }

    /// Check whether this term is exactly the given atom
    pub fn is_atom(&self, atom: &Atom) -> bool {
        matches!(self, Term::Atom(a) if a == atom)
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Term::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to floats
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Term::Integer(n) => Some(*n as f64),
            Term::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Term]> {
        match self {
            Term::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Term]> {
        match self {
            Term::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Heap words this term occupies in an environment.
    ///
    /// One word per node, plus the payload of binaries and strings rounded
    /// up to whole 8-byte words.
    pub fn heap_size(&self) -> usize {
        match self {
            Term::List(items) | Term::Tuple(items) => {
                1 + items.iter().map(Term::heap_size).sum::<usize>()
            }
            Term::Binary(bytes) => 1 + payload_words(bytes.len()),
            Term::String(s) => 1 + payload_words(s.len()),
            _ => 1,
        }
    }

    /// Get the type name of this term
    pub fn type_name(&self) -> &'static str {
        match self {
            Term::Integer(_) => "integer",
            Term::Float(_) => "float",
            Term::Atom(_) => "atom",
            Term::Binary(_) => "binary",
            Term::String(_) => "string",
            Term::List(_) => "list",
            Term::Tuple(_) => "tuple",
            Term::Pid(_) => "pid",
            Term::Fun(_) => "fun",
            Term::Resource(_) => "resource",
        }
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Integer(n)
    }
}

impl From<f64> for Term {
    fn from(x: f64) -> Self {
        Term::Float(x)
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Term::Atom(if b { atoms::TRUE } else { atoms::FALSE })
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::String(s.to_string())
    }
}

impl From<Vec<Term>> for Term {
    fn from(items: Vec<Term>) -> Self {
        Term::List(items)
    }
}

fn write_seq(f: &mut fmt::Formatter<'_>, items: &[Term]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Integer(n) => write!(f, "{}", n),
            Term::Float(x) => write!(f, "{:?}", x),
            Term::Atom(a) => write!(f, "{}", a),
            Term::Binary(bytes) => {
                f.write_str("<<")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", b)?;
                }
                f.write_str(">>")
            }
            Term::String(s) => write!(f, "{:?}", s),
            Term::List(items) => {
                f.write_str("[")?;
                write_seq(f, items)?;
                f.write_str("]")
            }
            Term::Tuple(items) => {
                f.write_str("{")?;
                write_seq(f, items)?;
                f.write_str("}")
            }
            Term::Pid(pid) => write!(f, "{}", pid),
            Term::Fun(fun) => write!(f, "&{}/{}", fun.name, fun.arity),
            Term::Resource(res) => write!(f, "{}", res),
        }
    }
}

fn payload_words(bytes: usize) -> usize {
    (bytes + 7) / 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_size_counts_containers() {
        let term = Term::tuple(vec![
            Term::atom("add"),
            Term::list(vec![Term::Integer(1), Term::Integer(2)]),
        ]);
        assert_eq!(term.heap_size(), 5);
    }

    #[test]
    fn test_heap_size_counts_payload_bytes() {
        assert_eq!(Term::Binary(vec![]).heap_size(), 1);
        assert_eq!(Term::Binary(vec![0; 8]).heap_size(), 2);
        assert_eq!(Term::Binary(vec![0; 9]).heap_size(), 3);
        assert_eq!(Term::string("hello").heap_size(), 2);
        assert_eq!(Term::Binary(vec![0; 1024]).heap_size(), 129);
    }

    #[test]
    fn test_display_erlang_shapes() {
        let term = Term::ok(Term::list(vec![Term::Integer(1), Term::Binary(vec![7, 8])]));
        assert_eq!(term.to_string(), "{ok,[1,<<7,8>>]}");
        assert_eq!(Term::fun("add", 2).to_string(), "&add/2");
    }

    #[test]
    fn test_clone_is_deep() {
        let original = Term::list(vec![Term::Binary(vec![1, 2, 3])]);
        let mut copy = original.clone();
        if let Term::List(items) = &mut copy {
            items.push(Term::nil());
        }
        assert_eq!(original.heap_size(), 3);
        assert_eq!(copy.heap_size(), 4);
    }

    #[test]
    fn test_atom_equality_ignores_storage() {
        assert_eq!(Term::atom("ok"), Term::Atom(atoms::OK));
        assert!(Term::atom("badarg").is_atom(&atoms::BADARG));
    }

    #[test]
    fn test_integer_widens_to_float() {
        assert_eq!(Term::Integer(3).as_float(), Some(3.0));
        assert_eq!(Term::string("x").as_float(), None);
    }
}
