// ASTs
use crate::constant::Constant;
use crate::span::{Spanned, SpannedBox};
use crate::typesystem::TypeId;
use std::fmt;

// The expression tree handed to the code generator. Names are already
// resolved and every node has a type in the SemanticContext.

#[derive(Debug)]
pub struct ExprLiteral(pub Spanned<Constant>);
#[derive(Debug)]
pub struct ExprIdentifier(pub Spanned<String>);
#[derive(Debug)]
pub struct ExprAssignment(
    pub Spanned<AssignOp>,
    pub SpannedBox<Expr>,
    pub SpannedBox<Expr>,
);
#[derive(Debug)]
pub struct ExprUnOp(pub Spanned<UnaryOp>, pub SpannedBox<Expr>);
#[derive(Debug)]
pub struct ExprBinOp(
    pub Spanned<BinOperand>,
    pub SpannedBox<Expr>,
    pub SpannedBox<Expr>,
);
#[derive(Debug)]
pub struct ExprConditional(
    pub SpannedBox<Expr>,
    pub SpannedBox<Expr>,
    pub SpannedBox<Expr>,
);
#[derive(Debug)]
pub struct ExprIndexAccess(pub SpannedBox<Expr>, pub SpannedBox<Expr>);
#[derive(Debug)]
pub struct ExprMemberAccess(pub SpannedBox<Expr>, pub Spanned<String>);
#[derive(Debug)]
pub struct ExprFunctionCall(
    pub SpannedBox<Expr>,
    pub Vec<SpannedBox<Expr>>,
    pub CallOptions,
);
/// `new T`, the created type.
#[derive(Debug)]
pub struct ExprNew(pub Spanned<TypeId>);
/// An elementary type name in expression position, e.g. `uint8` in
/// `uint8(x)`.
#[derive(Debug)]
pub struct ExprTypeName(pub Spanned<TypeId>);

/// Explicit `{gas: .., value: ..}` of an external call or a creation.
#[derive(Debug, Default)]
pub struct CallOptions {
    pub gas: Option<SpannedBox<Expr>>,
    pub value: Option<SpannedBox<Expr>>,
}

#[derive(Debug)]
pub enum Expr {
    Literal(ExprLiteral),
    Identifier(ExprIdentifier),
    Assignment(ExprAssignment),
    UnOp(ExprUnOp),
    BinOp(ExprBinOp),
    Conditional(ExprConditional),
    IndexAccess(ExprIndexAccess),
    MemberAccess(ExprMemberAccess),
    FunctionCall(ExprFunctionCall),
    New(ExprNew),
    TypeName(ExprTypeName),
}

impl Expr {
    pub fn is_literal(&self) -> bool {
        matches!(self, Expr::Literal(..))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOperand {
    // Logical
    LogicalOr,
    LogicalAnd,
    // Relationals
    Equal,
    Different,
    LowerThan,
    GreaterThan,
    LowerOrEqualThan,
    GreaterOrEqualThan,
    // Bitwise
    BitOr,
    BitXor,
    BitAnd,
    ShiftLeft,
    ShiftRight,
    // Arithmetic
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Modulo,
    Exponentiation,
}

impl BinOperand {
    pub fn is_logical(&self) -> bool {
        matches!(self, BinOperand::LogicalOr | BinOperand::LogicalAnd)
    }

    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            BinOperand::Equal
                | BinOperand::Different
                | BinOperand::LowerThan
                | BinOperand::GreaterThan
                | BinOperand::LowerOrEqualThan
                | BinOperand::GreaterOrEqualThan
        )
    }

    pub fn is_shift(&self) -> bool {
        matches!(self, BinOperand::ShiftLeft | BinOperand::ShiftRight)
    }

    pub fn is_commutative(&self) -> bool {
        matches!(
            self,
            BinOperand::Equal
                | BinOperand::Different
                | BinOperand::BitOr
                | BinOperand::BitXor
                | BinOperand::BitAnd
                | BinOperand::Addition
                | BinOperand::Multiplication
        )
    }
}

impl fmt::Display for BinOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                BinOperand::LogicalOr => "||",
                BinOperand::LogicalAnd => "&&",
                BinOperand::Equal => "==",
                BinOperand::Different => "!=",
                BinOperand::LowerThan => "<",
                BinOperand::GreaterThan => ">",
                BinOperand::LowerOrEqualThan => "<=",
                BinOperand::GreaterOrEqualThan => ">=",
                BinOperand::BitOr => "|",
                BinOperand::BitXor => "^",
                BinOperand::BitAnd => "&",
                BinOperand::ShiftLeft => "<<",
                BinOperand::ShiftRight => ">>",
                BinOperand::Addition => "+",
                BinOperand::Subtraction => "-",
                BinOperand::Multiplication => "*",
                BinOperand::Division => "/",
                BinOperand::Modulo => "%",
                BinOperand::Exponentiation => "**",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    LogicalNot,
    BitNot,
    Negation,
    Plus,
    Delete,
    Increment { prefix: bool },
    Decrement { prefix: bool },
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                UnaryOp::LogicalNot => "!",
                UnaryOp::BitNot => "~",
                UnaryOp::Negation => "-",
                UnaryOp::Plus => "+",
                UnaryOp::Delete => "delete",
                UnaryOp::Increment { .. } => "++",
                UnaryOp::Decrement { .. } => "--",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinOperand),
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignOp::Assign => write!(f, "="),
            AssignOp::Compound(op) => write!(f, "{}=", op),
        }
    }
}
