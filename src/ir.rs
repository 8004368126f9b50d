//! Target-agnostic representation of generated code
//!
//! Part synthesis and call assembly build these values; rendering them into
//! concrete source text for a particular output language happens in
//! [`crate::emit`]. Everything combinatorially interesting (which part
//! functions exist, which calls are guarded by which group-presence checks)
//! is decided here, before any target syntax is involved.

use ecow::EcoString;

use crate::{spec::MvLayout, symbolic::ScalarExpr};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Set,
    Add,
}

/// One generated assignment: `dst[index] = value` or `dst[index] += value`
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub dst: EcoString,
    pub index: usize,
    pub op: AssignOp,
    pub value: ScalarExpr,
}

/// A parameter of a part function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// Read-only coordinate array
    In(EcoString),
    /// Written coordinate array
    Out(EcoString),
    /// A single scalar value
    Val(EcoString),
    /// Outermorphism receiver
    Om(EcoString),
}

impl Param {
    pub fn name(&self) -> &EcoString {
        match self {
            Param::In(name) | Param::Out(name) | Param::Val(name) | Param::Om(name) => name,
        }
    }
}

/// The body of a part function
#[derive(Debug, Clone, PartialEq)]
pub enum PartBody {
    /// Straight-line assignments (expand strategy)
    Assign(Vec<Assignment>),
    /// The body was already emitted under another name; just call it
    Forward { callee: EcoString },
    /// Table-driven multiply (runtime strategy)
    TableCall(TableCall),
    /// (Un)dual computed as a one-blade geometric product through the
    /// runtime gp tables
    DualViaGp { factor: f64, gp_part: EcoString },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableCall {
    pub table: EcoString,
    pub compute_fn: EcoString,
    pub init_fn: EcoString,
    pub metric_id: usize,
    pub g1: usize,
    pub g2: usize,
    pub g3: usize,
}

/// A minimal subroutine computing one group-combination's contribution to
/// a whole-multivector operation
#[derive(Debug, Clone, PartialEq)]
pub struct PartFn {
    pub name: EcoString,
    pub comment: String,
    pub params: Vec<Param>,
    pub body: PartBody,
}

/// How an operand of an assembled operation behaves at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// General multivector: any group may be present, tracked by its
    /// group-usage bitmap
    Gmv,
    /// A bare scalar: only the scalar group, always present
    Scalar,
    /// Compile-time-typed multivector: the listed groups are always
    /// present, all others never are
    Specialized(u32),
    /// An outermorphism receiver (never expanded or guarded)
    Om,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub name: EcoString,
    pub kind: OperandKind,
}

impl Operand {
    pub fn gmv(name: impl Into<EcoString>) -> Self {
        Self {
            name: name.into(),
            kind: OperandKind::Gmv,
        }
    }
    pub fn scalar(name: impl Into<EcoString>) -> Self {
        Self {
            name: name.into(),
            kind: OperandKind::Scalar,
        }
    }
    pub fn specialized(name: impl Into<EcoString>, groups: u32) -> Self {
        Self {
            name: name.into(),
            kind: OperandKind::Specialized(groups),
        }
    }
    pub fn om(name: impl Into<EcoString>) -> Self {
        Self {
            name: name.into(),
            kind: OperandKind::Om,
        }
    }
    pub fn nb_groups(&self, layout: &MvLayout) -> usize {
        match self.kind {
            OperandKind::Scalar => 1,
            OperandKind::Om => 0,
            _ => layout.nb_groups(),
        }
    }
    /// No runtime presence check is needed for this group
    pub fn always_present(&self, group: usize) -> bool {
        match self.kind {
            OperandKind::Gmv => false,
            OperandKind::Scalar => group == 0,
            OperandKind::Specialized(mask) => mask & (1 << group) != 0,
            OperandKind::Om => true,
        }
    }
    /// This group can hold data at all
    pub fn may_be_present(&self, group: usize) -> bool {
        match self.kind {
            OperandKind::Gmv => true,
            OperandKind::Scalar => group == 0,
            OperandKind::Specialized(mask) => mask & (1 << group) != 0,
            OperandKind::Om => false,
        }
    }
}

/// A runtime presence check on one group of one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Guard {
    pub operand: usize,
    pub group: usize,
}

/// A reference to one expanded group of an operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRef {
    pub operand: usize,
    pub group: usize,
}

/// Where a part call writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dst {
    /// The slice of the scratch coordinates belonging to this group
    Group(usize),
    /// The one-coordinate scalar scratch
    Scalar,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartCall {
    pub name: EcoString,
    /// Operand passed verbatim in front of the group arguments
    /// (the outermorphism receiver)
    pub om_operand: Option<usize>,
    pub args: Vec<GroupRef>,
    pub dst: Dst,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Call(PartCall),
    /// `c[0] = 0` before accumulating a norm contribution
    ResetScalar,
    /// `n2 += mult * c[0]`
    AccumNorm { mult: f64 },
}

/// One step of an assembled operation. Consecutive steps sharing a guard
/// reuse the already-open conditional; the renderer tracks that in a single
/// left-to-right pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub outer: Option<Guard>,
    pub inner: Option<Guard>,
    pub action: Action,
}

impl Step {
    pub fn plain(action: Action) -> Self {
        Self {
            outer: None,
            inner: None,
            action,
        }
    }
}

/// How an assembled operation ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// Compress the dense scratch back into the sparse representation
    Compress(Usage),
    /// Scalar-returning product: return the scratch coordinate directly
    ReturnScalar,
    /// Return the norm accumulator, with an optional square root
    ReturnNorm {
        squared: bool,
        positive_definite: bool,
    },
}

/// The group-usage bitmap handed to compression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    /// Computed by the compress routine from the scratch coordinates
    Dynamic,
    /// Known to equal the runtime usage of an operand
    OfOperand(usize),
    /// Known statically
    Fixed(u32),
}

/// The complete body of a whole-multivector operation
#[derive(Debug, Clone, PartialEq)]
pub struct CallPlan {
    pub operands: Vec<Operand>,
    /// Dense scratch coordinate count (1 for scalar-returning operations)
    pub scratch_coords: usize,
    pub zero_scratch: bool,
    /// Declare the norm accumulator `n2`
    pub norm_accumulator: bool,
    pub steps: Vec<Step>,
    pub finish: Finish,
}

/// How the versor inverse is obtained in versor application code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersorInverse {
    /// The versor is unit: its reverse is its inverse
    Reverse,
    /// Compute the versor inverse
    Inverse,
    /// The inverse is passed explicitly as a third argument
    Explicit,
}

/// Versor application `V M V^-1`: two geometric products and a final
/// projection onto the grades present in the transformed operand
#[derive(Debug, Clone, PartialEq)]
pub struct VersorPlan {
    pub inverse: VersorInverse,
    pub gp_fn: EcoString,
    /// reverse or versor-inverse function, absent for an explicit inverse
    pub inverse_fn: Option<EcoString>,
    pub grade_fn: EcoString,
    pub operands: Vec<Operand>,
    pub grouped_by_grade: bool,
    /// Bitmask of groups per grade, for layouts not grouped by grade
    pub grade_masks: Vec<u32>,
}
