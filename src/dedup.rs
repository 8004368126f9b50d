//! Recognizing identical part-function bodies so each is compiled once
//!
//! Structurally repetitive algebras produce many group pairs with exactly
//! the same product code. The first occurrence is emitted in full; later
//! ones become calls to it.

use std::{collections::HashMap, fmt::Write};

use ecow::EcoString;

use crate::ir::{AssignOp, PartBody};

/// A per-(float type, metric) cache mapping body fingerprints to the name
/// of the function that first produced them. Discarded after its pass.
#[derive(Default)]
pub struct CodeCache {
    map: HashMap<String, EcoString>,
}

impl CodeCache {
    pub fn new() -> Self {
        Self::default()
    }
    /// On first sight of a body, remembers `name` and returns `None`
    /// ("emit as a new definition"). On a repeat, returns the name of the
    /// function to call instead.
    pub fn intern(&mut self, body: &PartBody, name: &EcoString) -> Option<EcoString> {
        let print = fingerprint(body);
        match self.map.get(&print) {
            Some(first) => Some(first.clone()),
            None => {
                self.map.insert(print, name.clone());
                None
            }
        }
    }
}

/// Canonical text of a body. This is computed from the IR, not from
/// rendered source, so two bodies that would only differ in target-syntax
/// cosmetics still hit the same cache entry.
pub fn fingerprint(body: &PartBody) -> String {
    let mut s = String::new();
    match body {
        PartBody::Assign(assignments) => {
            for a in assignments {
                let op = match a.op {
                    AssignOp::Set => "=",
                    AssignOp::Add => "+=",
                };
                _ = writeln!(s, "{}[{}] {} {}", a.dst, a.index, op, a.value);
            }
        }
        PartBody::Forward { callee } => {
            _ = writeln!(s, "forward {callee}");
        }
        PartBody::TableCall(call) => {
            _ = writeln!(
                s,
                "table {} {} {} {} {}",
                call.table, call.metric_id, call.g1, call.g2, call.g3
            );
        }
        PartBody::DualViaGp { factor, gp_part } => {
            _ = writeln!(s, "dual-gp {factor} {gp_part}");
        }
    }
    s
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        ir::Assignment,
        symbolic::ScalarExpr,
    };

    fn assign_body(value: &ScalarExpr) -> PartBody {
        PartBody::Assign(vec![Assignment {
            dst: "C".into(),
            index: 0,
            op: AssignOp::Add,
            value: value.clone(),
        }])
    }

    #[test]
    fn identical_bodies_reuse_the_first_name() {
        let mut cache = CodeCache::new();
        let value = ScalarExpr::symbol("A[0]").mul(&ScalarExpr::symbol("B[0]"));
        let first = assign_body(&value);
        // same value built in the other order: canonical form is equal
        let second = assign_body(&ScalarExpr::symbol("B[0]").mul(&ScalarExpr::symbol("A[0]")));
        assert_eq!(cache.intern(&first, &"gp_0_0_0".into()), None);
        assert_eq!(
            cache.intern(&second, &"gp_1_1_0".into()),
            Some("gp_0_0_0".into())
        );
        let different = assign_body(&value.neg());
        assert_eq!(cache.intern(&different, &"gp_0_1_1".into()), None);
    }
}
