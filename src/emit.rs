//! Rendering the IR into concrete source text per output language
//!
//! Everything in here is cosmetic: the decisions about which functions
//! exist and which calls are guarded were already made when the IR was
//! built. Adding an output language means extending [`Target`] and the
//! match arms below, without touching part synthesis.

use std::fmt::Write;

use enum_iterator::Sequence;
use serde::*;

use crate::{
    ir::*,
    spec::{FloatType, Spec},
    symbolic::ScalarExpr,
};

/// An output language
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Sequence, Serialize, Deserialize,
)]
pub enum Target {
    C,
    Cpp,
    CSharp,
    Java,
}

impl Target {
    /// C and C++ expand operands into per-group pointers; C# and Java into
    /// jagged arrays
    pub fn is_c_family(self) -> bool {
        matches!(self, Target::C | Target::Cpp)
    }
}

/// Operand letter used for expanded jagged arrays in C#/Java (`ac`, `bc`)
fn letter(operand: usize) -> char {
    (b'a' + operand as u8) as char
}

pub(crate) fn comment(target: Target, text: &str) -> String {
    match target {
        Target::C | Target::Cpp => format!("/* {text} */\n"),
        Target::CSharp | Target::Java => format!("/** {text} */\n"),
    }
}

fn sqrt_call(target: Target, ft: &FloatType) -> String {
    let single = ft.suffix.as_str() == "f";
    match target {
        Target::C | Target::Cpp => {
            if single {
                "sqrtf".into()
            } else {
                "sqrt".into()
            }
        }
        Target::CSharp => {
            if single {
                "(float)Math.Sqrt".into()
            } else {
                "Math.Sqrt".into()
            }
        }
        Target::Java => {
            if single {
                "(float)Math.sqrt".into()
            } else {
                "Math.sqrt".into()
            }
        }
    }
}

/// Renders a symbolic scalar with target float literals
pub fn expr_str(expr: &ScalarExpr, ft: &FloatType) -> String {
    if expr.is_zero() {
        return ft.literal(0.0);
    }
    let mut s = String::new();
    for (i, term) in expr.terms().iter().enumerate() {
        if i > 0 {
            s.push_str(if term.coef < 0.0 { " - " } else { " + " });
        } else if term.coef < 0.0 {
            s.push('-');
        }
        let coef = term.coef.abs();
        if term.factors.is_empty() {
            s.push_str(&ft.literal(coef));
        } else {
            if coef != 1.0 {
                s.push_str(&ft.literal(coef));
                s.push('*');
            }
            for (j, factor) in term.factors.iter().enumerate() {
                if j > 0 {
                    s.push('*');
                }
                s.push_str(factor);
            }
        }
    }
    s
}

fn param_str(target: Target, spec: &Spec, ft: &FloatType, param: &Param) -> String {
    let t = &ft.name;
    match (param, target) {
        (Param::In(n), Target::C | Target::Cpp) => format!("const {t} *{n}"),
        (Param::Out(n), Target::C | Target::Cpp) => format!("{t} *{n}"),
        (Param::In(n) | Param::Out(n), _) => format!("{t}[] {n}"),
        (Param::Val(n), _) => format!("{t} {n}"),
        (Param::Om(n), target) => {
            let om = spec
                .gom
                .as_ref()
                .map(|gom| ft.mangle(&gom.name))
                .unwrap_or_else(|| ft.mangle("om"));
            match target {
                Target::C => format!("const {om} *{n}"),
                Target::Cpp => format!("const {om} &{n}"),
                Target::CSharp | Target::Java => format!("{om} {n}"),
            }
        }
    }
}

/// Renders one part function. Returns the declaration (C and C++ only; the
/// comment goes with it) and the definition.
pub fn render_part_fn(
    target: Target,
    spec: &Spec,
    ft: &FloatType,
    part: &PartFn,
) -> (Option<String>, String) {
    let params: Vec<String> = part
        .params
        .iter()
        .map(|p| param_str(target, spec, ft, p))
        .collect();
    let access = match target {
        Target::C | Target::Cpp => "",
        Target::CSharp => "protected internal static ",
        Target::Java => "protected final static ",
    };
    let signature = format!("{access}void {}({})", part.name, params.join(", "));

    let mut def = String::new();
    let decl = if target.is_c_family() {
        Some(format!("{}{signature};\n", comment(target, &part.comment)))
    } else {
        def.push_str(&comment(target, &part.comment));
        None
    };
    _ = writeln!(def, "{signature} {{");
    def.push_str(&body_str(target, ft, part));
    def.push_str("}\n");
    (decl, def)
}

fn body_str(target: Target, ft: &FloatType, part: &PartFn) -> String {
    let mut s = String::new();
    match &part.body {
        PartBody::Assign(assignments) => {
            for a in assignments {
                let op = match a.op {
                    AssignOp::Set => "=",
                    AssignOp::Add => "+=",
                };
                _ = writeln!(
                    s,
                    "\t{}[{}] {op} {};",
                    a.dst,
                    a.index,
                    expr_str(&a.value, ft)
                );
            }
        }
        PartBody::Forward { callee } => {
            let args: Vec<&str> = part.params.iter().map(|p| p.name().as_str()).collect();
            _ = writeln!(s, "\t{callee}({});", args.join(", "));
        }
        PartBody::TableCall(call) => {
            let args: Vec<&str> = part.params.iter().map(|p| p.name().as_str()).collect();
            let args = args.join(", ");
            if target.is_c_family() {
                _ = writeln!(
                    s,
                    "\t{}({args}, &{}, {}, {}, {}, {});",
                    call.compute_fn, call.table, call.metric_id, call.g1, call.g2, call.g3
                );
            } else {
                _ = writeln!(
                    s,
                    "\tif ({} == null) {} = {}({}, {}, {}, {});",
                    call.table, call.table, call.init_fn, call.metric_id, call.g1, call.g2, call.g3
                );
                _ = writeln!(s, "\t{}({args}, {});", call.compute_fn, call.table);
            }
        }
        PartBody::DualViaGp { factor, gp_part } => {
            let [a, c] = [part.params[0].name(), part.params[1].name()];
            if target.is_c_family() {
                _ = writeln!(s, "\t{} B[1] = {{{}}};", ft.name, ft.literal(*factor));
            } else {
                _ = writeln!(
                    s,
                    "\t{}[] B = new {}[]{{{}}};",
                    ft.name,
                    ft.name,
                    ft.literal(*factor)
                );
            }
            _ = writeln!(s, "\t{gp_part}({a}, B, {c});");
        }
    }
    s
}

/// `fabs`-style absolute value call for coordinate comparisons
pub(crate) fn abs_call(target: Target, ft: &FloatType) -> &'static str {
    let single = ft.suffix.as_str() == "f";
    match target {
        Target::C | Target::Cpp => {
            if single {
                "fabsf"
            } else {
                "fabs"
            }
        }
        Target::CSharp => "Math.Abs",
        Target::Java => "Math.abs",
    }
}

/// Boolean literal; C represents booleans as ints
pub(crate) fn bool_lit(target: Target, value: bool) -> &'static str {
    match (target, value) {
        (Target::C, true) => "1",
        (Target::C, false) => "0",
        (_, true) => "true",
        (_, false) => "false",
    }
}

/// Runtime presence check for one group of one operand
pub(crate) fn presence_expr(target: Target, operands: &[Operand], guard: Guard) -> String {
    let operand = &operands[guard.operand];
    match target {
        Target::C => format!("{}->gu & {}", operand.name, 1u32 << guard.group),
        Target::Cpp => format!("{}.gu() & {}", operand.name, 1u32 << guard.group),
        Target::CSharp | Target::Java => {
            format!("{}c[{}] != null", letter(guard.operand), guard.group)
        }
    }
}

pub(crate) fn group_ref_str(target: Target, operands: &[Operand], arg: GroupRef) -> String {
    if target.is_c_family() {
        format!("_{}[{}]", operands[arg.operand].name, arg.group)
    } else {
        format!("{}c[{}]", letter(arg.operand), arg.group)
    }
}

/// Per-group references for every operand (without scratch storage)
pub(crate) fn expand_operands_str(
    target: Target,
    spec: &Spec,
    ft: &FloatType,
    operands: &[Operand],
) -> String {
    let t = &ft.name;
    let layout = &spec.layout;
    let mut s = String::new();
    if target.is_c_family() {
        for operand in operands {
            match operand.kind {
                OperandKind::Scalar => {
                    _ = writeln!(s, "const {t} *_{}[1] = {{&{}}};", operand.name, operand.name);
                }
                OperandKind::Gmv | OperandKind::Specialized(_) => {
                    _ = writeln!(
                        s,
                        "const {t} *_{}[{}];",
                        operand.name,
                        layout.nb_groups()
                    );
                }
                OperandKind::Om => {}
            }
        }
        for operand in operands {
            if matches!(operand.kind, OperandKind::Gmv | OperandKind::Specialized(_)) {
                if target == Target::C {
                    _ = writeln!(
                        s,
                        "{}(_{}, {});",
                        ft.mangle("expand"),
                        operand.name,
                        operand.name
                    );
                } else {
                    _ = writeln!(s, "{}.expand(_{});", operand.name, operand.name);
                }
            }
        }
    } else {
        for (i, operand) in operands.iter().enumerate() {
            match operand.kind {
                OperandKind::Scalar => {
                    _ = writeln!(
                        s,
                        "{t}[][] {}c = new {t}[][]{{new {t}[]{{{}}}}};",
                        letter(i),
                        operand.name
                    );
                }
                OperandKind::Gmv | OperandKind::Specialized(_) => {
                    _ = writeln!(s, "{t}[][] {}c = {}.c();", letter(i), operand.name);
                }
                OperandKind::Om => {}
            }
        }
    }
    s
}

/// The expansion prologue: scratch coordinates plus per-group references
/// for every operand
pub(crate) fn expand_str(
    target: Target,
    spec: &Spec,
    ft: &FloatType,
    plan: &CallPlan,
) -> String {
    let t = &ft.name;
    let layout = &spec.layout;
    let mut s = String::new();
    if target.is_c_family() {
        _ = writeln!(s, "{t} c[{}];", plan.scratch_coords);
        if plan.norm_accumulator {
            _ = writeln!(s, "{t} n2 = {};", ft.literal(0.0));
        }
        s.push_str(&expand_operands_str(target, spec, ft, &plan.operands));
        if plan.zero_scratch {
            _ = writeln!(
                s,
                "for (int i = 0; i < {}; i++) c[i] = {};",
                plan.scratch_coords,
                ft.literal(0.0)
            );
        }
    } else {
        s.push_str(&expand_operands_str(target, spec, ft, &plan.operands));
        if matches!(plan.finish, Finish::Compress(_)) {
            _ = writeln!(s, "{t}[][] cc = new {t}[{}][];", layout.nb_groups());
        } else {
            _ = writeln!(s, "{t}[] c = new {t}[1];");
        }
        if plan.norm_accumulator {
            _ = writeln!(s, "{t} n2 = {};", ft.literal(0.0));
        }
    }
    s
}

fn usage_expr(target: Target, spec: &Spec, plan: &CallPlan, usage: Usage) -> String {
    match usage {
        Usage::Dynamic => spec.layout.full_group_usage().to_string(),
        Usage::Fixed(mask) => mask.to_string(),
        Usage::OfOperand(i) => {
            let name = &plan.operands[i].name;
            match target {
                Target::C => format!("{name}->gu"),
                _ => format!("{name}.gu()"),
            }
        }
    }
}

pub(crate) fn finish_str(
    target: Target,
    spec: &Spec,
    ft: &FloatType,
    plan: &CallPlan,
    result_name: &str,
) -> String {
    let mut s = String::new();
    match plan.finish {
        Finish::ReturnScalar => {
            _ = writeln!(s, "return c[0];");
        }
        Finish::Compress(usage) => match target {
            Target::C => {
                _ = writeln!(
                    s,
                    "{}(c, {result_name}->c, &({result_name}->gu), {}, {});",
                    ft.mangle("compress"),
                    ft.literal(0.0),
                    usage_expr(target, spec, plan, usage)
                );
            }
            Target::Cpp => {
                _ = writeln!(
                    s,
                    "return {}_compress(c, {}, {});",
                    spec.mv_name(ft),
                    ft.literal(0.0),
                    usage_expr(target, spec, plan, usage)
                );
            }
            Target::CSharp | Target::Java => {
                _ = writeln!(s, "return new {}(cc);", spec.mv_name(ft));
            }
        },
        Finish::ReturnNorm {
            squared,
            positive_definite,
        } => {
            if squared {
                _ = writeln!(s, "return n2;");
            } else {
                let sqrt = sqrt_call(target, ft);
                if positive_definite {
                    _ = writeln!(s, "return {sqrt}(n2);");
                } else {
                    // a non-positive-definite metric can accumulate a
                    // negative norm squared
                    _ = writeln!(
                        s,
                        "return ((n2 < {}) ? {sqrt}(-n2) : {sqrt}(n2));",
                        ft.literal(0.0)
                    );
                }
            }
        }
    }
    s
}

/// The destination argument of a part call, with the lazy allocation line
/// the jagged-array targets need before it
pub(crate) fn dst_str(
    target: Target,
    spec: &Spec,
    ft: &FloatType,
    dst: Dst,
) -> (Option<String>, String) {
    match dst {
        Dst::Scalar => (None, "c".into()),
        Dst::Group(g) => {
            if target.is_c_family() {
                (None, format!("c + {}", spec.layout.group_start(g)))
            } else {
                (
                    Some(format!(
                        "if (cc[{g}] == null) cc[{g}] = new {}[{}];",
                        ft.name,
                        spec.layout.group(g).len()
                    )),
                    format!("cc[{g}]"),
                )
            }
        }
    }
}

fn action_str(
    target: Target,
    spec: &Spec,
    ft: &FloatType,
    plan: &CallPlan,
    action: &Action,
    indent: usize,
) -> String {
    let tabs = "\t".repeat(indent);
    let mut s = String::new();
    match action {
        Action::ResetScalar => {
            _ = writeln!(s, "{tabs}c[0] = {};", ft.literal(0.0));
        }
        Action::AccumNorm { mult } => {
            if *mult == 1.0 {
                _ = writeln!(s, "{tabs}n2 += c[0];");
            } else if *mult == -1.0 {
                _ = writeln!(s, "{tabs}n2 -= c[0];");
            } else {
                _ = writeln!(s, "{tabs}n2 += {} * c[0];", ft.literal(*mult));
            }
        }
        Action::Call(call) => {
            let mut args = Vec::new();
            if let Some(om) = call.om_operand {
                args.push(plan.operands[om].name.to_string());
            }
            for &arg in &call.args {
                args.push(group_ref_str(target, &plan.operands, arg));
            }
            let (prelude, dst) = dst_str(target, spec, ft, call.dst);
            if let Some(prelude) = prelude {
                _ = writeln!(s, "{tabs}{prelude}");
            }
            args.push(dst);
            _ = writeln!(s, "{tabs}{}({});", call.name, args.join(", "));
        }
    }
    s
}

/// Renders the body of a whole-multivector operation: expansion, the
/// guarded part calls (opening and closing presence conditionals in a
/// single left-to-right pass), then compression or the scalar return.
pub fn render_plan(
    target: Target,
    spec: &Spec,
    ft: &FloatType,
    plan: &CallPlan,
    result_name: &str,
) -> String {
    let mut s = expand_str(target, spec, ft, plan);
    let mut open_outer: Option<Guard> = None;
    let mut open_inner: Option<Guard> = None;
    for step in &plan.steps {
        // close guards that no longer apply
        if open_inner.is_some() && (step.inner != open_inner || step.outer != open_outer) {
            s.push_str("\t}\n");
            open_inner = None;
        }
        if open_outer.is_some() && step.outer != open_outer {
            s.push_str("}\n");
            open_outer = None;
        }
        // open guards for this step
        if let Some(guard) = step.outer {
            if open_outer != Some(guard) {
                _ = writeln!(
                    s,
                    "if ({}) {{",
                    presence_expr(target, &plan.operands, guard)
                );
                open_outer = Some(guard);
            }
        }
        if let Some(guard) = step.inner {
            if open_inner != Some(guard) {
                _ = writeln!(
                    s,
                    "\tif ({}) {{",
                    presence_expr(target, &plan.operands, guard)
                );
                open_inner = Some(guard);
            }
        }
        let indent = open_outer.is_some() as usize + open_inner.is_some() as usize;
        s.push_str(&action_str(target, spec, ft, plan, &step.action, indent));
    }
    if open_inner.is_some() {
        s.push_str("\t}\n");
    }
    if open_outer.is_some() {
        s.push_str("}\n");
    }
    s.push_str(&finish_str(target, spec, ft, plan, result_name));
    s
}

/// Renders versor application: `V M inverse(V)` projected back onto the
/// grades of `M`
pub fn render_versor(
    target: Target,
    spec: &Spec,
    ft: &FloatType,
    plan: &VersorPlan,
    result_name: &str,
) -> String {
    let mut s = String::new();
    let versor = &plan.operands[0].name;
    let object = &plan.operands[1].name;
    let object_gu = match target {
        Target::C => format!("{object}->gu"),
        _ => format!("{object}.gu()"),
    };
    // grade usage of the object, as a bitmap of groups
    let usage_expr = if plan.grouped_by_grade {
        object_gu.clone()
    } else {
        let mut parts = Vec::new();
        for &mask in &plan.grade_masks {
            parts.push(format!("(({object_gu} & {mask}) != 0 ? {mask} : 0)"));
        }
        parts.join(" | ")
    };
    if target == Target::C {
        let mv = spec.mv_name(ft);
        let inverse_name = match plan.inverse {
            VersorInverse::Explicit => plan.operands[2].name.to_string(),
            VersorInverse::Inverse => {
                _ = writeln!(s, "{mv} inv; /* temp space for inverse */");
                "&inv".into()
            }
            VersorInverse::Reverse => {
                _ = writeln!(s, "{mv} rev; /* temp space for reverse */");
                "&rev".into()
            }
        };
        _ = writeln!(s, "{mv} tmp, tmp2; /* temp variables */");
        if let Some(inverse_fn) = &plan.inverse_fn {
            _ = writeln!(s, "{inverse_fn}({inverse_name}, {versor});");
        }
        _ = writeln!(s, "{}(&tmp, {versor}, {object});", plan.gp_fn);
        _ = writeln!(s, "{}(&tmp2, &tmp, {inverse_name});", plan.gp_fn);
        if !plan.grouped_by_grade {
            _ = writeln!(s, "int gradeUsageBitmap = {usage_expr};");
        }
        let usage = if plan.grouped_by_grade {
            usage_expr.as_str()
        } else {
            "gradeUsageBitmap"
        };
        _ = writeln!(
            s,
            "{}({result_name}, &tmp2, {usage}); \
            /* ditch grades not present in {object} */",
            plan.grade_fn
        );
    } else {
        if !plan.grouped_by_grade {
            _ = writeln!(s, "int gradeUsageBitmap = {usage_expr};");
        }
        let usage = if plan.grouped_by_grade {
            usage_expr.as_str()
        } else {
            "gradeUsageBitmap"
        };
        let inverse = match plan.inverse {
            VersorInverse::Explicit => plan.operands[2].name.to_string(),
            _ => format!("{}({versor})", plan.inverse_fn.as_ref().unwrap()),
        };
        _ = writeln!(
            s,
            "return {}({}({}({versor}, {object}), {inverse}), {usage});",
            plan.grade_fn, plan.gp_fn, plan.gp_fn
        );
    }
    s
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ir::{Assignment, PartBody, PartFn};

    fn tiny_part() -> PartFn {
        PartFn {
            name: "double_gp_default_1_1_0".into(),
            comment: "test part".into(),
            params: vec![Param::In("A".into()), Param::In("B".into()), Param::Out("C".into())],
            body: PartBody::Assign(vec![Assignment {
                dst: "C".into(),
                index: 0,
                op: AssignOp::Add,
                value: ScalarExpr::symbol("A[0]").mul(&ScalarExpr::symbol("B[0]")),
            }]),
        }
    }

    #[test]
    fn part_fn_c_and_csharp() {
        let spec = Spec::euclidean("t", 2);
        let ft = FloatType::double();
        let (decl, def) = render_part_fn(Target::C, &spec, &ft, &tiny_part());
        let decl = decl.unwrap();
        assert!(decl.contains("void double_gp_default_1_1_0(const double *A, const double *B, double *C);"));
        assert!(def.contains("\tC[0] += A[0]*B[0];"));
        let (decl, def) = render_part_fn(Target::CSharp, &spec, &ft, &tiny_part());
        assert!(decl.is_none());
        assert!(def.contains("protected internal static void"));
        assert!(def.contains("double[] A"));
    }

    #[test]
    fn forward_body_calls_through() {
        let mut part = tiny_part();
        part.body = PartBody::Forward {
            callee: "double_gp_default_0_0_0".into(),
        };
        let (_, def) = render_part_fn(Target::Java, &Spec::euclidean("t", 2), &FloatType::double(), &part);
        assert!(def.contains("\tdouble_gp_default_0_0_0(A, B, C);"));
    }

    #[test]
    fn expr_uses_float_literals() {
        let ft = FloatType::float();
        let e = ScalarExpr::symbol("A[1]").scale(-2.0).add(&ScalarExpr::constant(0.5));
        assert_eq!(expr_str(&e, &ft), "0.5f - 2.0f*A[1]");
        assert_eq!(expr_str(&ScalarExpr::zero(), &ft), "0.0f");
    }
}
