//! Host functions callable from source programs.
//!
//! Natives are declared statically as [`NativeDef`]s, grouped into
//! libraries, and brought into a compilation unit either by the prelude or
//! by an import declaration.

use std::{collections::HashMap, fmt, io, rc::Rc};

use thiserror::Error;

use crate::{
    runtime::{
        error::{RuntimeError, RuntimeResult},
        slots::Shape,
        value::Value,
    },
    types::{self, Type, TypeRegistry},
};

pub type NativeFn = fn(&[Value], &mut dyn io::Write) -> RuntimeResult<Value>;

/// A host function with a one-letter type per argument and a one-letter
/// return type.
pub struct NativeDef {
    pub name: &'static str,
    pub params: &'static [(&'static str, char)],
    pub ret: char,
    pub func: NativeFn,
}

/// A native resolved against a type registry, under the name it is callable
/// by.
pub struct Builtin {
    pub name: Rc<str>,
    pub params: Vec<(Rc<str>, Type)>,
    pub ret: Type,
    pub shape: Shape,
    pub func: NativeFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("ret", &self.ret)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("native {name} uses undefined primitive {alias}")]
    UndefinedPrimitive { name: &'static str, alias: char },
    #[error("function {0} is already defined")]
    Duplicate(Rc<str>),
}

/// The natives visible to one compilation unit, in import order.
#[derive(Debug, Default)]
pub struct Builtins {
    natives: Vec<Rc<Builtin>>,
    index: HashMap<Rc<str>, usize>,
}

impl Builtins {
    pub fn empty() -> Builtins {
        Builtins::default()
    }

    /// The natives every program may call unprefixed.
    pub fn prelude(registry: &TypeRegistry) -> Builtins {
        let mut builtins = Builtins::empty();
        builtins
            .import(None, PRELUDE, registry)
            .expect("prelude natives are well-formed");
        builtins
    }

    /// Brings `defs` in, named `{prefix}__{name}` when a prefix is given.
    pub fn import(
        &mut self,
        prefix: Option<&str>,
        defs: &[NativeDef],
        registry: &TypeRegistry,
    ) -> Result<(), ImportError> {
        for def in defs {
            let name: Rc<str> = match prefix {
                Some(prefix) => format!("{prefix}__{}", def.name).into(),
                None => def.name.into(),
            };
            if self.index.contains_key(&name) {
                return Err(ImportError::Duplicate(name));
            }
            let resolve = |alias: char| {
                registry.get(alias).ok_or(ImportError::UndefinedPrimitive {
                    name: def.name,
                    alias,
                })
            };
            let params = def
                .params
                .iter()
                .map(|&(param, alias)| Ok((Rc::from(param), resolve(alias)?)))
                .collect::<Result<Vec<_>, ImportError>>()?;
            let ret = resolve(def.ret)?;
            let shape = Shape {
                params: params
                    .iter()
                    .map(|(param, ty)| (Rc::clone(param), repr_of(ty)))
                    .collect(),
                returns: Rc::from([repr_of(&ret)]),
            };
            self.index.insert(Rc::clone(&name), self.natives.len());
            self.natives.push(Rc::new(Builtin {
                name,
                params,
                ret,
                shape,
                func: def.func,
            }));
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Rc<Builtin>> {
        self.index.get(name).map(|&i| &self.natives[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Builtin>> {
        self.natives.iter()
    }

    pub fn len(&self) -> usize {
        self.natives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.natives.is_empty()
    }
}

fn repr_of(ty: &Type) -> types::Repr {
    ty.repr().unwrap_or(types::Repr::Pointer)
}

/// Native libraries importable by path.
pub struct Libraries {
    map: HashMap<Box<str>, &'static [NativeDef]>,
}

impl Libraries {
    pub fn empty() -> Libraries {
        Libraries {
            map: HashMap::new(),
        }
    }

    pub fn register(&mut self, path: &str, defs: &'static [NativeDef]) {
        self.map.insert(path.into(), defs);
    }

    pub fn get(&self, path: &str) -> Option<&'static [NativeDef]> {
        self.map.get(path).copied()
    }
}

/// Only the `ext` library is available by default.
impl Default for Libraries {
    fn default() -> Libraries {
        let mut libraries = Libraries::empty();
        libraries.register("ext", EXT);
        libraries
    }
}

macro_rules! native {
    ($name:literal ($($param:literal : $ty:literal),*) -> $ret:literal = $func:expr) => {
        NativeDef {
            name: $name,
            params: &[$(($param, $ty)),*],
            ret: $ret,
            func: $func,
        }
    };
}

pub static PRELUDE: &[NativeDef] = &[
    native!("add"("x": 'R', "y": 'R') -> 'R' = add),
    native!("sub"("x": 'R', "y": 'R') -> 'R' = sub),
    native!("mul"("x": 'R', "y": 'R') -> 'R' = mul),
    native!("div"("x": 'R', "y": 'R') -> 'R' = div),
    native!("abs"("x": 'R') -> 'R' = abs),
    native!("lt"("x": 'R', "y": 'R') -> 'B' = lt),
    native!("le"("x": 'R', "y": 'R') -> 'B' = le),
    native!("gt"("x": 'R', "y": 'R') -> 'B' = gt),
    native!("ge"("x": 'R', "y": 'R') -> 'B' = ge),
    native!("eq"("x": 'R', "y": 'R') -> 'B' = eq_real),
    native!("neq"("x": 'R', "y": 'R') -> 'B' = neq_real),
    native!("not"("x": 'B') -> 'B' = not),
    native!("print"("x": 'R') -> 'R' = print_and_return),
];

/// The `ext` library: operations prefixed by the primitive they act on.
pub static EXT: &[NativeDef] = &[
    native!("R__add"("x": 'R', "y": 'R') -> 'R' = add),
    native!("R__sub"("x": 'R', "y": 'R') -> 'R' = sub),
    native!("R__mul"("x": 'R', "y": 'R') -> 'R' = mul),
    native!("R__div"("x": 'R', "y": 'R') -> 'R' = div),
    native!("R__abs"("x": 'R') -> 'R' = abs),
    native!("R__lt"("x": 'R', "y": 'R') -> 'B' = lt),
    native!("R__le"("x": 'R', "y": 'R') -> 'B' = le),
    native!("R__gt"("x": 'R', "y": 'R') -> 'B' = gt),
    native!("R__ge"("x": 'R', "y": 'R') -> 'B' = ge),
    native!("R__eq"("x": 'R', "y": 'R') -> 'B' = eq_real),
    native!("R__neq"("x": 'R', "y": 'R') -> 'B' = neq_real),
    native!("R__print"("x": 'R') -> 'R' = print_and_return),
    native!("B__not"("x": 'B') -> 'B' = not),
    native!("B__eq"("x": 'B', "y": 'B') -> 'B' = eq_bool),
    native!("B__neq"("x": 'B', "y": 'B') -> 'B' = neq_bool),
    native!("B__print"("x": 'B') -> 'B' = print_and_return),
    native!("S__eq"("x": 'S', "y": 'S') -> 'B' = eq_str),
    native!("S__neq"("x": 'S', "y": 'S') -> 'B' = neq_str),
    native!("S__print"("x": 'S') -> 'S' = print_and_return),
];

fn reals(args: &[Value]) -> RuntimeResult<(f64, f64)> {
    Ok((args[0].as_real()?, args[1].as_real()?))
}

fn add(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    let (x, y) = reals(args)?;
    Ok(Value::Real(x + y))
}

fn sub(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    let (x, y) = reals(args)?;
    Ok(Value::Real(x - y))
}

fn mul(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    let (x, y) = reals(args)?;
    Ok(Value::Real(x * y))
}

fn div(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    let (x, y) = reals(args)?;
    if y == 0.0 {
        return Err(RuntimeError::DivisionByZero);
    }
    Ok(Value::Real(x / y))
}

fn abs(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    Ok(Value::Real(args[0].as_real()?.abs()))
}

fn lt(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    let (x, y) = reals(args)?;
    Ok(Value::Bool(x < y))
}

fn le(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    let (x, y) = reals(args)?;
    Ok(Value::Bool(x <= y))
}

fn gt(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    let (x, y) = reals(args)?;
    Ok(Value::Bool(x > y))
}

fn ge(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    let (x, y) = reals(args)?;
    Ok(Value::Bool(x >= y))
}

#[allow(clippy::float_cmp)]
fn eq_real(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    let (x, y) = reals(args)?;
    Ok(Value::Bool(x == y))
}

#[allow(clippy::float_cmp)]
fn neq_real(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    let (x, y) = reals(args)?;
    Ok(Value::Bool(x != y))
}

fn not(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    Ok(Value::Bool(!args[0].as_bool()?))
}

fn eq_bool(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    Ok(Value::Bool(args[0].as_bool()? == args[1].as_bool()?))
}

fn neq_bool(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    Ok(Value::Bool(args[0].as_bool()? != args[1].as_bool()?))
}

fn eq_str(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    Ok(Value::Bool(args[0].as_str()? == args[1].as_str()?))
}

fn neq_str(args: &[Value], _: &mut dyn io::Write) -> RuntimeResult<Value> {
    Ok(Value::Bool(args[0].as_str()? != args[1].as_str()?))
}

/// Writes its single argument on its own line and hands it back.
pub fn print_and_return(args: &[Value], out: &mut dyn io::Write) -> RuntimeResult<Value> {
    writeln!(out, "{}", args[0])?;
    Ok(args[0].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Repr;

    #[test]
    fn prelude_resolves_against_builtin_primitives() {
        let registry = TypeRegistry::with_builtins();
        let prelude = Builtins::prelude(&registry);
        assert_eq!(prelude.len(), PRELUDE.len());
        let add = prelude.get("add").unwrap();
        assert_eq!(add.params.len(), 2);
        assert_eq!(add.ret.alias(), "R");
        assert_eq!(add.shape.total_arity(), 3);
        assert_eq!(prelude.get("not").unwrap().shape.returns[..], [Repr::Bool]);
    }

    #[test]
    fn prefixed_import() {
        let registry = TypeRegistry::with_builtins();
        let mut builtins = Builtins::empty();
        builtins.import(Some("m"), EXT, &registry).unwrap();
        assert!(builtins.get("m__R__add").is_some());
        assert!(builtins.get("R__add").is_none());
        assert_eq!(
            builtins.import(Some("m"), EXT, &registry),
            Err(ImportError::Duplicate("m__R__add".into()))
        );
    }

    #[test]
    fn undefined_primitive_in_native() {
        static BAD: &[NativeDef] = &[native!("bad"("x": 'Q') -> 'R' = abs)];
        let registry = TypeRegistry::with_builtins();
        assert_eq!(
            Builtins::empty().import(None, BAD, &registry),
            Err(ImportError::UndefinedPrimitive {
                name: "bad",
                alias: 'Q'
            })
        );
    }

    #[test]
    fn print_writes_and_returns() {
        let mut out = Vec::new();
        let value = print_and_return(&[Value::Real(2.5)], &mut out).unwrap();
        assert_eq!(value, Value::Real(2.5));
        assert_eq!(String::from_utf8(out).unwrap(), "2.5\n");
    }

    #[test]
    fn division_by_zero() {
        let args = [Value::Real(1.0), Value::Real(0.0)];
        assert!(matches!(
            div(&args, &mut io::sink()),
            Err(RuntimeError::DivisionByZero)
        ));
    }
}
