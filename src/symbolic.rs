//! Symbolic multivectors and the products defined over them
//!
//! A symbolic scalar is a canonically ordered sum of terms, each a float
//! coefficient times a product of coordinate names such as `A[0]*B[2]`.
//! Generated part-function bodies come from evaluating products of these
//! values and reading off the surviving coefficients.

use std::fmt;

use ecow::EcoString;

use crate::{
    algebra::{canonical_reordering_sign, BasisBlade},
    metric::Metric,
    UserError, GagenResult,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    pub coef: f64,
    pub factors: Vec<EcoString>,
}

/// A sum of terms, kept in canonical order so that equal expressions are
/// structurally equal
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScalarExpr {
    terms: Vec<Term>,
}

impl ScalarExpr {
    pub fn zero() -> Self {
        Self::default()
    }
    pub fn constant(value: f64) -> Self {
        Self {
            terms: vec![Term {
                coef: value,
                factors: Vec::new(),
            }],
        }
        .normalized()
    }
    pub fn symbol(name: impl Into<EcoString>) -> Self {
        Self {
            terms: vec![Term {
                coef: 1.0,
                factors: vec![name.into()],
            }],
        }
    }
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }
    pub fn as_constant(&self) -> Option<f64> {
        match self.terms.as_slice() {
            [] => Some(0.0),
            [term] if term.factors.is_empty() => Some(term.coef),
            _ => None,
        }
    }
    pub fn add(&self, other: &Self) -> Self {
        let mut terms = self.terms.clone();
        terms.extend(other.terms.iter().cloned());
        Self { terms }.normalized()
    }
    pub fn mul(&self, other: &Self) -> Self {
        let mut terms = Vec::with_capacity(self.terms.len() * other.terms.len());
        for a in &self.terms {
            for b in &other.terms {
                let mut factors = a.factors.clone();
                factors.extend(b.factors.iter().cloned());
                terms.push(Term {
                    coef: a.coef * b.coef,
                    factors,
                });
            }
        }
        Self { terms }.normalized()
    }
    pub fn scale(&self, factor: f64) -> Self {
        Self {
            terms: self
                .terms
                .iter()
                .map(|t| Term {
                    coef: t.coef * factor,
                    factors: t.factors.clone(),
                })
                .collect(),
        }
        .normalized()
    }
    pub fn neg(&self) -> Self {
        self.scale(-1.0)
    }
    /// Snaps coefficients within `eps` of an integer to that integer and
    /// drops the terms that snap to zero
    pub fn round(&self, eps: f64) -> Self {
        let mut rounded = self.clone();
        for term in &mut rounded.terms {
            let snapped = term.coef.round();
            if (term.coef - snapped).abs() < eps {
                term.coef = snapped;
            }
        }
        rounded.normalized()
    }
    fn normalized(mut self) -> Self {
        for term in &mut self.terms {
            term.factors.sort();
        }
        self.terms.sort_by(|a, b| a.factors.cmp(&b.factors));
        let mut merged: Vec<Term> = Vec::with_capacity(self.terms.len());
        for term in self.terms {
            match merged.last_mut() {
                Some(last) if last.factors == term.factors => last.coef += term.coef,
                _ => merged.push(term),
            }
        }
        merged.retain(|t| t.coef != 0.0);
        Self { terms: merged }
    }
}

impl fmt::Display for ScalarExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(if term.coef < 0.0 { " - " } else { " + " })?;
            } else if term.coef < 0.0 {
                write!(f, "-")?;
            }
            let coef = term.coef.abs();
            if coef != 1.0 || term.factors.is_empty() {
                write!(f, "{coef}")?;
                if !term.factors.is_empty() {
                    write!(f, "*")?;
                }
            }
            for (j, factor) in term.factors.iter().enumerate() {
                if j > 0 {
                    write!(f, "*")?;
                }
                write!(f, "{factor}")?;
            }
        }
        Ok(())
    }
}

/// One graded component of a symbolic multivector
#[derive(Debug, Clone, PartialEq)]
pub struct SymBlade {
    pub bitmap: u32,
    pub weight: ScalarExpr,
}

/// A symbolic multivector: blades sorted by grade, then bitmap
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Multivector {
    blades: Vec<SymBlade>,
}

impl Multivector {
    pub fn zero() -> Self {
        Self::default()
    }
    pub fn from_blades(blades: impl IntoIterator<Item = (u32, ScalarExpr)>) -> Self {
        let mut mv = Self::zero();
        for (bitmap, weight) in blades {
            mv.accumulate(bitmap, weight);
        }
        mv
    }
    /// The unit pseudoscalar of an `n`-dimensional algebra
    pub fn pseudoscalar(dims: u8) -> Self {
        Self::from_blades([((1u32 << dims) - 1, ScalarExpr::constant(1.0))])
    }
    pub fn scalar(value: f64) -> Self {
        Self::from_blades([(0, ScalarExpr::constant(value))])
    }
    pub fn blades(&self) -> &[SymBlade] {
        &self.blades
    }
    pub fn is_zero(&self) -> bool {
        self.blades.is_empty()
    }
    pub fn weight(&self, bitmap: u32) -> ScalarExpr {
        self.blades
            .iter()
            .find(|b| b.bitmap == bitmap)
            .map(|b| b.weight.clone())
            .unwrap_or_default()
    }
    fn accumulate(&mut self, bitmap: u32, weight: ScalarExpr) {
        if weight.is_zero() {
            return;
        }
        let key = (bitmap.count_ones(), bitmap);
        match self
            .blades
            .binary_search_by_key(&key, |b| (b.bitmap.count_ones(), b.bitmap))
        {
            Ok(i) => {
                self.blades[i].weight = self.blades[i].weight.add(&weight);
                if self.blades[i].weight.is_zero() {
                    self.blades.remove(i);
                }
            }
            Err(i) => self.blades.insert(i, SymBlade { bitmap, weight }),
        }
    }
    pub fn add(&self, other: &Self) -> Self {
        let mut result = self.clone();
        for blade in &other.blades {
            result.accumulate(blade.bitmap, blade.weight.clone());
        }
        result
    }
    pub fn reverse(&self) -> Self {
        self.map_signs(|b| b.reverse().scale)
    }
    pub fn grade_involution(&self) -> Self {
        self.map_signs(|b| b.grade_involution().scale)
    }
    fn map_signs(&self, sign: impl Fn(BasisBlade) -> f64) -> Self {
        Self {
            blades: self
                .blades
                .iter()
                .map(|b| SymBlade {
                    bitmap: b.bitmap,
                    weight: b.weight.scale(sign(BasisBlade::unit(b.bitmap))),
                })
                .collect(),
        }
    }
    /// Multiplies every blade weight by a symbolic scalar
    pub fn mul_scalar(&self, scalar: &ScalarExpr) -> Self {
        Self {
            blades: self
                .blades
                .iter()
                .map(|b| SymBlade {
                    bitmap: b.bitmap,
                    weight: b.weight.mul(scalar),
                })
                .filter(|b| !b.weight.is_zero())
                .collect(),
        }
    }
    pub fn grade_part(&self, grade: u8) -> Self {
        Self {
            blades: self
                .blades
                .iter()
                .filter(|b| b.bitmap.count_ones() as u8 == grade)
                .cloned()
                .collect(),
        }
    }
    pub fn round(&self, eps: f64) -> Self {
        let mut rounded = Self::zero();
        for blade in &self.blades {
            rounded.accumulate(blade.bitmap, blade.weight.round(eps));
        }
        rounded
    }

    /// Geometric product under the given metric
    pub fn gp(&self, other: &Self, metric: &Metric) -> Self {
        if let Some(eigen) = metric.eigen() {
            let n = metric.dim() as usize;
            let a = to_eigen_blades(&self.blades, &eigen.vectors, n, false);
            let b = to_eigen_blades(&other.blades, &eigen.vectors, n, false);
            let product = gp_diagonal_blades(&a, &b, &eigen.values);
            let mut result = Self::zero();
            for blade in &to_eigen_blades(&product, &eigen.vectors, n, true) {
                result.accumulate(blade.bitmap, blade.weight.clone());
            }
            result
        } else {
            let factors = metric.basis_factors();
            Self::from_blades(
                gp_diagonal_blades(&self.blades, &other.blades, &factors)
                    .into_iter()
                    .map(|b| (b.bitmap, b.weight)),
            )
        }
    }

    /// Outer product (metric-independent)
    pub fn outer(&self, other: &Self) -> Self {
        let mut result = Self::zero();
        for a in &self.blades {
            for b in &other.blades {
                let blade =
                    BasisBlade::unit(a.bitmap).outer(&BasisBlade::unit(b.bitmap));
                if blade.scale == 0.0 {
                    continue;
                }
                result.accumulate(
                    blade.bitmap,
                    a.weight.mul(&b.weight).scale(blade.scale),
                );
            }
        }
        result
    }

    /// Dual with respect to the full space: `A * I^-1`.
    /// Fails when the metric leaves the pseudoscalar non-invertible.
    pub fn dual(&self, metric: &Metric) -> GagenResult<Self> {
        let i = Self::pseudoscalar(metric.dim());
        let i_rev = i.reverse();
        let norm = i
            .gp(&i_rev, metric)
            .round(1e-12)
            .weight(0)
            .as_constant()
            .unwrap_or(0.0);
        if norm.abs() < 1e-10 {
            return Err(UserError::new(format!(
                "Non-invertible pseudoscalar in metric {}",
                metric.name()
            ))
            .into());
        }
        let mut inverse = Self::zero();
        for blade in &i_rev.blades {
            inverse.accumulate(blade.bitmap, blade.weight.scale(1.0 / norm));
        }
        Ok(self.gp(&inverse, metric))
    }

    /// Undual: `A * I`, the inverse of [`Self::dual`]
    pub fn undual(&self, metric: &Metric) -> Self {
        self.gp(&Self::pseudoscalar(metric.dim()), metric)
    }
}

fn gp_diagonal_blades(a: &[SymBlade], b: &[SymBlade], factors: &[f64]) -> Vec<SymBlade> {
    let mut result = Multivector::zero();
    for x in a {
        for y in b {
            let blade = BasisBlade::unit(x.bitmap).gp_diagonal(&BasisBlade::unit(y.bitmap), factors);
            if blade.scale == 0.0 {
                continue;
            }
            result.accumulate(blade.bitmap, x.weight.mul(&y.weight).scale(blade.scale));
        }
    }
    result.blades
}

/// Rewrites blades into (`back == false`) or out of (`back == true`) the
/// orthogonal eigenbasis of a non-diagonal metric. Each basis vector maps
/// to a weighted sum of eigenbasis vectors, so a blade expands into the
/// wedge of those sums.
fn to_eigen_blades(blades: &[SymBlade], q: &[f64], n: usize, back: bool) -> Vec<SymBlade> {
    let mut result = Multivector::zero();
    for blade in blades {
        let mut expansion: Vec<(u32, f64)> = vec![(0, 1.0)];
        let mut bitmap = blade.bitmap;
        while bitmap != 0 {
            let i = bitmap.trailing_zeros() as usize;
            bitmap &= bitmap - 1;
            let mut next = Vec::with_capacity(expansion.len() * n);
            for &(bm, coef) in &expansion {
                for j in 0..n {
                    // e_i = sum_k Q[i][k] f_k going in, f_k = sum_i Q[i][k] e_i coming back
                    let q_coef = if back { q[j * n + i] } else { q[i * n + j] };
                    if q_coef == 0.0 || bm & (1 << j) != 0 {
                        continue;
                    }
                    let sign = canonical_reordering_sign(bm, 1 << j);
                    next.push((bm | (1 << j), coef * q_coef * sign));
                }
            }
            expansion = next;
        }
        for (bm, coef) in expansion {
            result.accumulate(bm, blade.weight.scale(coef));
        }
    }
    result.blades
}
