//! Expression AST definitions.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use tabula_core::Value;

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

impl BinaryOp {
    /// Returns the operator symbol used in diagnostics.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        }
    }

    /// Returns true for `= <> < <= > >=`.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq
        )
    }
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateFunc {
    Sum,
    Count,
    Avg,
    Min,
    Max,
    StDev,
    Var,
}

impl AggregateFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        let func = match name.to_ascii_lowercase().as_str() {
            "sum" => AggregateFunc::Sum,
            "count" => AggregateFunc::Count,
            "avg" => AggregateFunc::Avg,
            "min" => AggregateFunc::Min,
            "max" => AggregateFunc::Max,
            "stdev" => AggregateFunc::StDev,
            "var" => AggregateFunc::Var,
            _ => return None,
        };
        Some(func)
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunc::Sum => "Sum",
            AggregateFunc::Count => "Count",
            AggregateFunc::Avg => "Avg",
            AggregateFunc::Min => "Min",
            AggregateFunc::Max => "Max",
            AggregateFunc::StDev => "StDev",
            AggregateFunc::Var => "Var",
        }
    }
}

/// Scalar functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Substring,
    Len,
    Trim,
    IsNull,
    Iif,
    Convert,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        let func = match name.to_ascii_lowercase().as_str() {
            "substring" => Function::Substring,
            "len" => Function::Len,
            "trim" => Function::Trim,
            "isnull" => Function::IsNull,
            "iif" => Function::Iif,
            "convert" => Function::Convert,
            _ => return None,
        };
        Some(func)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Substring => "SUBSTRING",
            Function::Len => "LEN",
            Function::Trim => "TRIM",
            Function::IsNull => "ISNULL",
            Function::Iif => "IIF",
            Function::Convert => "CONVERT",
        }
    }

    /// Number of arguments the function takes.
    pub fn arity(&self) -> usize {
        match self {
            Function::Len | Function::Trim => 1,
            Function::IsNull | Function::Convert => 2,
            Function::Substring | Function::Iif => 3,
        }
    }
}

/// Rows an aggregate reduces over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AggregateScope {
    /// Every live row of the evaluating row's table.
    Local,
    /// Child rows of the evaluating row, through the named relation or the
    /// table's only child relation.
    Child(Option<String>),
}

/// Expression AST node.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Literal value.
    Literal(Value),
    /// Column of the evaluating row.
    Column(String),
    /// Column of the parent row, through the named relation or the table's
    /// only parent relation.
    Parent {
        relation: Option<String>,
        column: String,
    },
    /// Aggregate over a row set.
    Aggregate {
        func: AggregateFunc,
        scope: AggregateScope,
        column: String,
    },
    /// Unary operation.
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// Binary operation.
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `expr [NOT] IN (list)`.
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// `expr [NOT] LIKE pattern`.
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
    },
    /// `expr IS [NOT] NULL`.
    IsNull { expr: Box<Expr>, negated: bool },
    /// Scalar function call.
    Function { func: Function, args: Vec<Expr> },
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    /// Visits this node and every descendant, parents first.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Literal(_) | Expr::Column(_) | Expr::Parent { .. } | Expr::Aggregate { .. } => {}
            Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } => expr.walk(f),
            Expr::Binary { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            Expr::In { expr, list, .. } => {
                expr.walk(f);
                list.iter().for_each(|e| e.walk(f));
            }
            Expr::Like { expr, pattern, .. } => {
                expr.walk(f);
                pattern.walk(f);
            }
            Expr::Function { args, .. } => args.iter().for_each(|e| e.walk(f)),
        }
    }

    /// Names of the evaluating row's own columns this expression reads.
    pub fn local_columns(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Column(name) = e {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
        });
        out
    }

    /// Explicit relation names this expression navigates.
    pub fn relation_names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        self.walk(&mut |e| {
            let rel = match e {
                Expr::Parent { relation: Some(r), .. } => Some(r.as_str()),
                Expr::Aggregate {
                    scope: AggregateScope::Child(Some(r)),
                    ..
                } => Some(r.as_str()),
                _ => None,
            };
            if let Some(r) = rel {
                if !out.contains(&r) {
                    out.push(r);
                }
            }
        });
        out
    }

    /// True if the value depends only on the evaluating row's own cells.
    pub fn is_row_local(&self) -> bool {
        let mut local = true;
        self.walk(&mut |e| {
            if matches!(e, Expr::Parent { .. } | Expr::Aggregate { .. }) {
                local = false;
            }
        });
        local
    }

    /// True if the expression contains any aggregate.
    pub fn has_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(&mut |e| {
            if matches!(e, Expr::Aggregate { .. }) {
                found = true;
            }
        });
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_local_columns_dedup() {
        let e = Expr::binary(
            BinaryOp::Add,
            Expr::column("a"),
            Expr::binary(BinaryOp::Mul, Expr::column("b"), Expr::column("a")),
        );
        assert_eq!(e.local_columns(), vec!["a", "b"]);
        assert!(e.is_row_local());
    }

    #[test]
    fn test_relation_names() {
        let e = Expr::binary(
            BinaryOp::Add,
            Expr::Aggregate {
                func: AggregateFunc::Sum,
                scope: AggregateScope::Child(Some("rel".into())),
                column: "amount".into(),
            },
            Expr::Parent {
                relation: None,
                column: "x".into(),
            },
        );
        assert_eq!(e.relation_names(), vec!["rel"]);
        assert!(!e.is_row_local());
        assert!(e.has_aggregate());
    }

    #[test]
    fn test_function_lookup() {
        assert_eq!(Function::from_name("IsNull"), Some(Function::IsNull));
        assert_eq!(Function::from_name("nope"), None);
        assert_eq!(AggregateFunc::from_name("STDEV"), Some(AggregateFunc::StDev));
        assert_eq!(Function::Iif.arity(), 3);
    }
}
