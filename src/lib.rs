/*! Specification-driven geometric algebra code generation

`gagen` takes an algebra specification (dimension, metrics, a grouped
multivector layout, requested float types) and produces source code in one
of several target languages implementing multivector arithmetic for that
algebra.

The center of the crate is the parts engine: whole-multivector operations
are decomposed into minimal per-group-combination subroutines
("parts", see [`parts`]), identical part bodies are emitted once
([`dedup`]), and the assembled operations dispatch over the groups
actually present at runtime. Part synthesis works on symbolic multivector
values ([`symbolic`]) and builds a target-agnostic IR ([`ir`]) that a
per-language renderer ([`emit`]) turns into source text.

```
use gagen::{emit::Target, parts, spec::Spec};

let spec = Spec::euclidean("e3", 3);
let code = parts::generate_parts_code(&spec, Target::C, false);
assert!(code.errors.is_empty());
assert!(code.def.contains("double_gp_default_1_1_0"));
```
*/

pub mod algebra;
pub mod dedup;
pub mod emit;
mod error;
pub mod ir;
pub mod metric;
pub mod parts;
pub mod spec;
pub mod symbolic;

pub use error::*;
