//! The algebra specification: everything a generation run is driven by

use ecow::EcoString;
use serde::*;

use crate::{
    algebra::{mask_table, BasisBlade},
    metric::Metric,
    symbolic::{Multivector, ScalarExpr},
    UserError,
};

/// A floating point type of the generated code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FloatType {
    /// Type name in the target language, e.g. `float`
    pub name: EcoString,
    /// Literal suffix, e.g. `f`
    pub suffix: EcoString,
}

impl FloatType {
    pub fn float() -> Self {
        Self {
            name: "float".into(),
            suffix: "f".into(),
        }
    }
    pub fn double() -> Self {
        Self {
            name: "double".into(),
            suffix: "".into(),
        }
    }
    /// Prefixes a function or type name with this float type so generated
    /// names never collide across float types
    pub fn mangle(&self, base: &str) -> EcoString {
        format!("{}_{}", self.name, base).into()
    }
    /// A literal of this type, e.g. `2.0f`
    pub fn literal(&self, value: f64) -> String {
        if value == value.trunc() && value.is_finite() && value.abs() < 1e15 {
            format!("{:.1}{}", value, self.suffix)
        } else {
            format!("{}{}", value, self.suffix)
        }
    }
}

/// How general multivector product code is generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CodeStrategy {
    /// Fully expanded straight-line arithmetic
    #[default]
    Expand,
    /// Lookup tables computed at runtime, fed to a generic multiply routine
    Runtime,
}

/// The coordinate layout of the general multivector type: an ordered list
/// of groups, each group an ordered list of basis blades of one grade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "LayoutRep", into = "LayoutRep")]
pub struct MvLayout {
    name: EcoString,
    dim: u8,
    groups: Vec<Vec<BasisBlade>>,
    /// bitmap -> group index, -1 when the bitmap is not in the layout
    group_table: Vec<i32>,
    /// bitmap -> offset within its group
    offset_table: Vec<i32>,
    starts: Vec<usize>,
}

impl MvLayout {
    pub fn new(name: impl Into<EcoString>, dim: u8, groups: Vec<Vec<BasisBlade>>) -> Self {
        let size = 1usize << dim;
        let mut group_table = vec![-1i32; size];
        let mut offset_table = vec![-1i32; size];
        let mut starts = Vec::with_capacity(groups.len());
        let mut start = 0;
        for (g, group) in groups.iter().enumerate() {
            starts.push(start);
            start += group.len();
            for (i, blade) in group.iter().enumerate() {
                let bm = blade.bitmap as usize;
                if bm < size && group_table[bm] < 0 {
                    group_table[bm] = g as i32;
                    offset_table[bm] = i as i32;
                }
            }
        }
        Self {
            name: name.into(),
            dim,
            groups,
            group_table,
            offset_table,
            starts,
        }
    }

    /// The standard layout: one group per grade, blades in grade-major
    /// bitmap order
    pub fn grouped_by_grade(name: impl Into<EcoString>, dim: u8) -> Self {
        let mut groups = vec![Vec::new(); dim as usize + 1];
        for bitmap in mask_table(dim) {
            groups[bitmap.count_ones() as usize].push(BasisBlade::unit(bitmap));
        }
        Self::new(name, dim, groups)
    }

    pub fn name(&self) -> &EcoString {
        &self.name
    }
    pub fn dim(&self) -> u8 {
        self.dim
    }
    pub fn nb_groups(&self) -> usize {
        self.groups.len()
    }
    pub fn group(&self, g: usize) -> &[BasisBlade] {
        &self.groups[g]
    }
    pub fn group_grade(&self, g: usize) -> u8 {
        self.groups[g][0].grade()
    }
    /// Index of the group's first coordinate in the dense coordinate array
    pub fn group_start(&self, g: usize) -> usize {
        self.starts[g]
    }
    pub fn total_coords(&self) -> usize {
        self.starts.last().copied().unwrap_or(0)
            + self.groups.last().map(|g| g.len()).unwrap_or(0)
    }
    /// Bitmap to (group, offset) lookup
    pub fn find(&self, bitmap: u32) -> Option<(usize, usize)> {
        let g = *self.group_table.get(bitmap as usize)?;
        (g >= 0).then(|| (g as usize, self.offset_table[bitmap as usize] as usize))
    }
    /// A bitmap with every group bit set
    pub fn full_group_usage(&self) -> u32 {
        (1u32 << self.groups.len()) - 1
    }
    /// Whether group `g` holds exactly grade `g` for every grade, i.e. the
    /// standard grouped-by-grade layout
    pub fn is_grouped_by_grade(&self) -> bool {
        self.groups.len() == self.dim as usize + 1
            && (self.groups.iter().enumerate())
                .all(|(g, group)| group.iter().all(|b| b.grade() as usize == g))
    }

    /// Grade arithmetic only: can the geometric product of groups `g1` and
    /// `g2` contribute to group `g3` at all? The product of grades `a` and
    /// `b` holds only grades `|a-b|, |a-b|+2, .., a+b`.
    pub fn zero_gp_by_grade(&self, g1: usize, g2: usize, g3: usize) -> bool {
        let a = self.group_grade(g1) as i32;
        let b = self.group_grade(g2) as i32;
        let c = self.group_grade(g3) as i32;
        c < (a - b).abs() || c > a + b || (a + b - c) % 2 != 0
    }

    /// The symbolic value of one group, with coordinates named
    /// `name[0]`, `name[1]`, ..
    pub fn symbolic_group(&self, g: usize, name: &str) -> Multivector {
        Multivector::from_blades(self.groups[g].iter().enumerate().map(|(i, blade)| {
            (
                blade.bitmap,
                ScalarExpr::symbol(format!("{name}[{i}]")).scale(blade.scale),
            )
        }))
    }

    pub fn validate(&self, errors: &mut Vec<UserError>) {
        let size = 1u32 << self.dim;
        let mut seen = vec![false; size as usize];
        for (g, group) in self.groups.iter().enumerate() {
            if group.is_empty() {
                errors.push(UserError::new(format!(
                    "Multivector group {g} of {} is empty",
                    self.name
                )));
                continue;
            }
            let grade = group[0].grade();
            for blade in group {
                if blade.bitmap >= size {
                    errors.push(UserError::new(format!(
                        "Basis blade bitmap {:#b} in group {g} is out of range \
                        for dimension {}",
                        blade.bitmap, self.dim
                    )));
                    continue;
                }
                if blade.grade() != grade {
                    errors.push(UserError::new(format!(
                        "Group {g} of {} mixes grades {grade} and {}",
                        self.name,
                        blade.grade()
                    )));
                }
                if seen[blade.bitmap as usize] {
                    errors.push(UserError::new(format!(
                        "Basis blade bitmap {:#b} appears twice in {}",
                        blade.bitmap, self.name
                    )));
                }
                seen[blade.bitmap as usize] = true;
            }
        }
        if !seen.iter().all(|&s| s) {
            errors.push(UserError::new(format!(
                "Multivector layout {} does not cover every basis blade",
                self.name
            )));
        }
    }
}

#[derive(Serialize, Deserialize)]
struct LayoutRep {
    name: EcoString,
    dim: u8,
    groups: Vec<Vec<BasisBlade>>,
}

impl From<LayoutRep> for MvLayout {
    fn from(rep: LayoutRep) -> Self {
        MvLayout::new(rep.name, rep.dim, rep.groups)
    }
}

impl From<MvLayout> for LayoutRep {
    fn from(l: MvLayout) -> Self {
        LayoutRep {
            name: l.name,
            dim: l.dim,
            groups: l.groups,
        }
    }
}

/// A general outermorphism: per-grade domain and range blade lists. The
/// generated code stores one matrix per grade; entry `(r, c)` of the grade
/// `g` matrix is coordinate `m<g>[r * cols + c]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GomSpec {
    pub name: EcoString,
    /// Domain blades for grades 1..=dim (index by grade - 1)
    pub domain: Vec<Vec<BasisBlade>>,
    /// Range blades for grades 1..=dim
    pub range: Vec<Vec<BasisBlade>>,
}

impl GomSpec {
    /// The full outermorphism over the standard blade order
    pub fn full(name: impl Into<EcoString>, dim: u8) -> Self {
        let mut domain = vec![Vec::new(); dim as usize];
        for bitmap in mask_table(dim) {
            let grade = bitmap.count_ones() as usize;
            if grade > 0 {
                domain[grade - 1].push(BasisBlade::unit(bitmap));
            }
        }
        Self {
            name: name.into(),
            range: domain.clone(),
            domain,
        }
    }

    pub fn domain_for_grade(&self, grade: u8) -> &[BasisBlade] {
        &self.domain[grade as usize - 1]
    }

    /// The symbolic image of domain column `c` at the given grade.
    /// `access` is the receiver prefix, e.g. `O->` or `O.`.
    pub fn image(&self, grade: u8, col: usize, access: &str) -> Multivector {
        let cols = self.domain[grade as usize - 1].len();
        Multivector::from_blades(
            (self.range[grade as usize - 1].iter().enumerate()).map(|(r, blade)| {
                (
                    blade.bitmap,
                    ScalarExpr::symbol(format!("{access}m{grade}[{}]", r * cols + col))
                        .scale(blade.scale),
                )
            }),
        )
    }
}

/// A full algebra specification, the input of a generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    pub name: EcoString,
    pub dim: u8,
    pub basis_vector_names: Vec<EcoString>,
    pub float_types: Vec<FloatType>,
    pub metrics: Vec<Metric>,
    pub layout: MvLayout,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub gom: Option<GomSpec>,
    #[serde(default)]
    pub strategy: CodeStrategy,
}

impl Spec {
    /// A Euclidean algebra with the standard grouped-by-grade layout,
    /// useful as a starting point and in tests
    pub fn euclidean(name: impl Into<EcoString>, dim: u8) -> Self {
        let name = name.into();
        Self {
            dim,
            basis_vector_names: (1..=dim).map(|i| format!("e{i}").into()).collect(),
            float_types: vec![FloatType::double()],
            metrics: vec![Metric::euclidean("default", dim)],
            layout: MvLayout::grouped_by_grade("mv", dim),
            gom: None,
            strategy: CodeStrategy::Expand,
            name,
        }
    }

    /// The mangled name of the general multivector type for a float type
    pub fn mv_name(&self, ft: &FloatType) -> EcoString {
        ft.mangle(self.layout.name())
    }

    pub fn validate(&self) -> Vec<UserError> {
        let mut errors = Vec::new();
        if self.basis_vector_names.len() != self.dim as usize {
            errors.push(UserError::new(format!(
                "Algebra {} has dimension {} but {} basis vector names",
                self.name,
                self.dim,
                self.basis_vector_names.len()
            )));
        }
        for metric in &self.metrics {
            if metric.dim() != self.dim {
                errors.push(UserError::new(format!(
                    "Metric {} has dimension {} but the algebra has dimension {}",
                    metric.name(),
                    metric.dim(),
                    self.dim
                )));
            }
        }
        if self.layout.dim() != self.dim {
            errors.push(UserError::new(format!(
                "Multivector layout {} does not match algebra dimension {}",
                self.layout.name(),
                self.dim
            )));
        }
        self.layout.validate(&mut errors);
        errors
    }
}
