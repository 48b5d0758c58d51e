use crate::{SqlFragment, Value};
use std::borrow::Cow;

/// Binary operators with a direct SQL spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOpType {
    Multiplication,
    Division,
    Addition,
    Subtraction,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOpType {
    /// Lower numbers bind weaker; the visitor parenthesizes children whose
    /// operator binds no stronger than their parent.
    pub fn precedence(&self) -> i32 {
        match self {
            BinaryOpType::Or => 100,
            BinaryOpType::And => 200,
            BinaryOpType::Equal
            | BinaryOpType::NotEqual
            | BinaryOpType::Less
            | BinaryOpType::LessEqual
            | BinaryOpType::Greater
            | BinaryOpType::GreaterEqual => 300,
            BinaryOpType::Addition | BinaryOpType::Subtraction => 800,
            BinaryOpType::Multiplication | BinaryOpType::Division => 900,
        }
    }

    /// Whether `a op (b op c)` may drop the parentheses.
    pub fn associative(&self) -> bool {
        matches!(
            self,
            BinaryOpType::And
                | BinaryOpType::Or
                | BinaryOpType::Addition
                | BinaryOpType::Multiplication
        )
    }

    pub fn sql(&self) -> &'static str {
        match self {
            BinaryOpType::Multiplication => " * ",
            BinaryOpType::Division => " / ",
            BinaryOpType::Addition => " + ",
            BinaryOpType::Subtraction => " - ",
            BinaryOpType::Equal => " = ",
            BinaryOpType::NotEqual => " <> ",
            BinaryOpType::Less => " < ",
            BinaryOpType::LessEqual => " <= ",
            BinaryOpType::Greater => " > ",
            BinaryOpType::GreaterEqual => " >= ",
            BinaryOpType::And => " AND ",
            BinaryOpType::Or => " OR ",
        }
    }
}

/// A predicate or scalar expression over one mapped type.
///
/// A closed sum: the visitor pattern-matches exhaustively, so a construct
/// with no SQL equivalent can only enter through [`Expr::Call`], which fails
/// compilation with an `Unsupported` error naming the method.
///
/// Captured Rust values are folded to [`Expr::Literal`] at construction;
/// member accesses on the query parameter enter as [`Expr::Column`].
#[derive(Debug, Clone)]
pub enum Expr {
    /// Property of the queried type, resolved to `table.column` through the
    /// mapping metadata.
    Column(Cow<'static, str>),
    /// Constant-folded value, bound as a statement parameter.
    Literal(Value),
    Binary {
        op: BinaryOpType,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    Negative(Box<Expr>),
    Coalesce(Box<Expr>, Box<Expr>),
    /// Case-insensitive starts-with over the string domain.
    StartsWith(Box<Expr>, Box<Expr>),
    /// Case-insensitive ends-with.
    EndsWith(Box<Expr>, Box<Expr>),
    /// Case-insensitive contains.
    Contains(Box<Expr>, Box<Expr>),
    ToLower(Box<Expr>),
    ToUpper(Box<Expr>),
    /// Membership in an in-memory sequence; compiled to `IN (...)` batched
    /// to respect engine parameter-count limits.
    In(Box<Expr>, Vec<Value>),
    /// Membership in a lazily-computed sub-query, embedded as SQL.
    InQuery(Box<Expr>, SqlFragment),
    /// Method call with no first-class node; compilation rejects it.
    Call { method: String, args: Vec<Expr> },
}

impl Expr {
    pub fn col(name: impl Into<Cow<'static, str>>) -> Expr {
        Expr::Column(name.into())
    }

    pub fn val(value: impl Into<Value>) -> Expr {
        Expr::Literal(value.into())
    }

    pub fn null() -> Expr {
        Expr::Literal(Value::Null)
    }

    fn binary(op: BinaryOpType, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn eq(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOpType::Equal, self, rhs)
    }

    pub fn ne(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOpType::NotEqual, self, rhs)
    }

    pub fn lt(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOpType::Less, self, rhs)
    }

    pub fn le(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOpType::LessEqual, self, rhs)
    }

    pub fn gt(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOpType::Greater, self, rhs)
    }

    pub fn ge(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOpType::GreaterEqual, self, rhs)
    }

    pub fn and(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOpType::And, self, rhs)
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOpType::Or, self, rhs)
    }

    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    pub fn coalesce(self, fallback: Expr) -> Expr {
        Expr::Coalesce(Box::new(self), Box::new(fallback))
    }

    pub fn starts_with(self, rhs: Expr) -> Expr {
        Expr::StartsWith(Box::new(self), Box::new(rhs))
    }

    pub fn ends_with(self, rhs: Expr) -> Expr {
        Expr::EndsWith(Box::new(self), Box::new(rhs))
    }

    pub fn contains(self, rhs: Expr) -> Expr {
        Expr::Contains(Box::new(self), Box::new(rhs))
    }

    pub fn to_lower(self) -> Expr {
        Expr::ToLower(Box::new(self))
    }

    pub fn to_upper(self) -> Expr {
        Expr::ToUpper(Box::new(self))
    }

    pub fn in_values(self, values: impl IntoIterator<Item = Value>) -> Expr {
        Expr::In(Box::new(self), values.into_iter().collect())
    }

    pub fn in_query(self, query: SqlFragment) -> Expr {
        Expr::InQuery(Box::new(self), query)
    }

    pub fn precedence(&self) -> i32 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Not(..) | Expr::Negative(..) => 250,
            _ => 1_000_000,
        }
    }
}

impl std::ops::Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOpType::Addition, self, rhs)
    }
}

impl std::ops::Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOpType::Subtraction, self, rhs)
    }
}

impl std::ops::Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOpType::Multiplication, self, rhs)
    }
}

impl std::ops::Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::binary(BinaryOpType::Division, self, rhs)
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Negative(Box::new(self))
    }
}

/// Sort direction of one ORDER BY element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// An expression carrying ordering information.
#[derive(Debug, Clone)]
pub struct Ordered {
    pub expression: Expr,
    pub order: Order,
}

impl Ordered {
    pub fn asc(expression: Expr) -> Self {
        Self {
            expression,
            order: Order::Asc,
        }
    }

    pub fn desc(expression: Expr) -> Self {
        Self {
            expression,
            order: Order::Desc,
        }
    }
}
