use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Static value types.
///
/// `Int < Double < String` forms the coercion lattice: the narrower operand of
/// a binary operation is converted to the wider one. `Logic` marks a boolean
/// that only exists as pending jumps and is never stored in a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    Logic,
    Int,
    Double,
    String,
    Void,
    Invalid,
}

impl VarType {
    /// Types that own a slot space in a function frame.
    pub fn is_storable(self) -> bool {
        matches!(self, VarType::Int | VarType::Double | VarType::String)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, VarType::Int | VarType::Double)
    }

    /// Position in the coercion lattice, `None` outside of it.
    fn rank(self) -> Option<u8> {
        match self {
            VarType::Int => Some(1),
            VarType::Double => Some(2),
            VarType::String => Some(3),
            _ => None,
        }
    }

    /// Compare two lattice members. `None` if either is not part of the lattice.
    pub fn lattice_cmp(self, other: VarType) -> Option<Ordering> {
        Some(self.rank()?.cmp(&other.rank()?))
    }

    /// Common operating type of a binary operation.
    pub fn common(a: VarType, b: VarType) -> VarType {
        if a == b {
            return a;
        }
        match (a, b) {
            (VarType::Void | VarType::Invalid, _) | (_, VarType::Void | VarType::Invalid) => {
                VarType::Invalid
            }
            (VarType::String, _) | (_, VarType::String) => VarType::String,
            (VarType::Int, VarType::Double) | (VarType::Double, VarType::Int) => VarType::Double,
            _ => VarType::Invalid,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VarType::Logic => "logic",
            VarType::Int => "int",
            VarType::Double => "double",
            VarType::String => "string",
            VarType::Void => "void",
            VarType::Invalid => "invalid",
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One (type, name) entry of a signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureElement {
    pub ty: VarType,
    pub name: String,
}

/// Function signature. Element 0 is the return type, elements 1.. are the
/// parameters in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SignatureElement>", into = "Vec<SignatureElement>")]
pub struct Signature(Vec<SignatureElement>);

impl TryFrom<Vec<SignatureElement>> for Signature {
    type Error = String;

    fn try_from(elements: Vec<SignatureElement>) -> Result<Self, Self::Error> {
        if elements.is_empty() {
            return Err("signature needs a return type element".into());
        }
        Ok(Signature(elements))
    }
}

impl From<Signature> for Vec<SignatureElement> {
    fn from(signature: Signature) -> Self {
        signature.0
    }
}

impl Signature {
    pub const RETURN_NAME: &'static str = "return";

    pub fn new<N: Into<String>>(
        return_type: VarType,
        params: impl IntoIterator<Item = (VarType, N)>,
    ) -> Self {
        let mut elements = vec![SignatureElement {
            ty: return_type,
            name: Self::RETURN_NAME.to_string(),
        }];
        elements.extend(params.into_iter().map(|(ty, name)| SignatureElement {
            ty,
            name: name.into(),
        }));
        Signature(elements)
    }

    pub fn return_type(&self) -> VarType {
        self.0[0].ty
    }

    pub fn params(&self) -> &[SignatureElement] {
        &self.0[1..]
    }

    pub fn param_count(&self) -> usize {
        self.0.len() - 1
    }

    pub fn param_type(&self, index: usize) -> Option<VarType> {
        self.params().get(index).map(|p| p.ty)
    }

    pub fn elements(&self) -> &[SignatureElement] {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", p.ty, p.name)?;
        }
        write!(f, ") -> {}", self.return_type())
    }
}
