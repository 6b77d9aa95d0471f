// src/args.rs

//! Argument expansion.
//!
//! Turns mixed positional / flag-style arguments into the flat string list
//! handed to the spawned process:
//!
//! - `Arg::from("HEAD")` → `["HEAD"]`
//! - `Arg::flag("n", 1)` → `["-n", "1"]`
//! - `Arg::switch("cached", true)` → `["--cached"]`
//! - `Arg::switch("cached", false)` → `[]`

/// Value carried by a flag-style argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    /// Present (`true`) or omitted (`false`), no value.
    Switch(bool),
    /// Flag followed by a value.
    Value(String),
}

/// One call-style argument before expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Value(String),
    Flag { name: String, value: FlagValue },
}

impl Arg {
    pub fn flag(name: impl Into<String>, value: impl ToString) -> Self {
        Arg::Flag {
            name: name.into(),
            value: FlagValue::Value(value.to_string()),
        }
    }

    pub fn switch(name: impl Into<String>, on: bool) -> Self {
        Arg::Flag {
            name: name.into(),
            value: FlagValue::Switch(on),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Value(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Value(s)
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Self {
        Arg::Value(s.clone())
    }
}

macro_rules! arg_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Arg {
                fn from(n: $t) -> Self {
                    Arg::Value(n.to_string())
                }
            }
        )*
    };
}

arg_from_number!(i32, i64, u32, u64, usize, f64);

fn flag_prefix(name: &str) -> String {
    if name.chars().count() == 1 {
        format!("-{name}")
    } else {
        format!("--{name}")
    }
}

/// Flatten arguments into the final argument vector, preserving order.
pub fn expand_args<I, A>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = A>,
    A: Into<Arg>,
{
    let mut out = Vec::new();
    for arg in args {
        match arg.into() {
            Arg::Value(v) => out.push(v),
            Arg::Flag { name, value } => match value {
                FlagValue::Switch(true) => out.push(flag_prefix(&name)),
                FlagValue::Switch(false) => {}
                FlagValue::Value(v) => {
                    out.push(flag_prefix(&name));
                    out.push(v);
                }
            },
        }
    }
    out
}
