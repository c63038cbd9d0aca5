use std::fmt;

/// Payload of a finished task or test.
#[derive(Debug, Clone, PartialEq)]
pub enum Val {
    None,
    Int(i64),
    String(String),
    Vec(Vec<Val>),
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::None => write!(f, "-"),
            Val::Int(i) => write!(f, "{}", i),
            Val::String(s) => write!(f, "{}", s),
            Val::Vec(v) => {
                write!(f, "[")?;
                for (i, val) in v.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", val)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<u32> for Val {
    fn from(v: u32) -> Self {
        Val::Int(v as i64)
    }
}

impl From<&str> for Val {
    fn from(s: &str) -> Self {
        Val::String(s.to_string())
    }
}
