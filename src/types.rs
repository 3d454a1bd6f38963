use std::{collections::HashMap, fmt, rc::Rc};

use crate::token::Span;

pub mod builtins {
    use super::Repr;

    pub const INTEGER: char = 'N';
    pub const REAL: char = 'R';
    pub const BOOLEAN: char = 'B';
    pub const STRING: char = 'S';
    pub const POINTER: char = 'P';
    pub const FUNCTION: char = 'F';

    pub const ALL: &[(char, Repr)] = &[
        (INTEGER, Repr::Int),
        (REAL, Repr::Real),
        (BOOLEAN, Repr::Bool),
        (STRING, Repr::Str),
        (POINTER, Repr::Pointer),
        (FUNCTION, Repr::Callable),
    ];
}

/// The runtime representation a primitive stands for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Repr {
    Int,
    Real,
    Bool,
    Str,
    Pointer,
    Callable,
}

impl Repr {
    pub const fn name(self) -> &'static str {
        match self {
            Repr::Int => "int",
            Repr::Real => "real",
            Repr::Bool => "boolean",
            Repr::Str => "string",
            Repr::Pointer => "pointer",
            Repr::Callable => "callable",
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The registry of single-letter type aliases of one compilation unit.
///
/// It is append-only: the parser extends it through primitive declarations,
/// and every later phase only reads from it.
pub struct TypeRegistry {
    map: HashMap<char, Type>,
}

impl TypeRegistry {
    fn with_capacity(capacity: usize) -> TypeRegistry {
        TypeRegistry {
            map: HashMap::with_capacity(capacity),
        }
    }

    /// A registry seeded with the built-in primitives. Every registry starts
    /// this way, so the built-in aliases can always be looked up.
    pub fn with_builtins() -> TypeRegistry {
        let mut registry = TypeRegistry::with_capacity(16);
        for &(alias, repr) in builtins::ALL {
            registry
                .define_primitive(alias, repr, Span::builtin())
                .expect("built-in aliases are distinct");
        }
        registry
    }

    pub fn has(&self, alias: char) -> bool {
        self.map.contains_key(&alias)
    }

    pub fn get(&self, alias: char) -> Option<Type> {
        self.map.get(&alias).cloned()
    }

    /// Looks up a one-letter alias given as text.
    pub fn lookup(&self, alias: &str) -> Option<Type> {
        let mut chars = alias.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => self.get(c),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Attempts to define a primitive.
    ///
    /// Fails if the alias is already defined.
    pub fn define_primitive(&mut self, alias: char, repr: Repr, span: Span) -> Result<Type, ()> {
        if self.has(alias) {
            return Err(());
        }
        let ty = Type::Primitive(Primitive(Rc::new(PrimitiveInner { alias, repr, span })));
        self.map.insert(alias, ty.clone());
        Ok(ty)
    }

    /// Attempts to define a named powerset over `base`.
    ///
    /// Fails if the alias is already defined.
    pub fn define_powerset(&mut self, alias: char, base: Type) -> Result<Type, ()> {
        if self.has(alias) {
            return Err(());
        }
        let ty = Type::Powerset(Powerset::named(alias, base));
        self.map.insert(alias, ty.clone());
        Ok(ty)
    }
}

/// An atomic, single-letter type.
#[derive(Clone)]
pub struct Primitive(Rc<PrimitiveInner>);

struct PrimitiveInner {
    alias: char,
    repr: Repr,
    /// Definition site
    span: Span,
}

impl Primitive {
    pub fn alias(&self) -> char {
        self.0.alias
    }

    pub fn repr(&self) -> Repr {
        self.0.repr
    }

    pub fn span(&self) -> &Span {
        &self.0.span
    }
}

/// A callable value whose argument and return shape is `base`.
///
/// Powersets declared in source carry their alias; the ones inferred for
/// function references and partial applications are nameless.
#[derive(Clone)]
pub struct Powerset(Rc<PowersetInner>);

struct PowersetInner {
    alias: Option<char>,
    base: Type,
}

impl Powerset {
    pub fn named(alias: char, base: Type) -> Powerset {
        Powerset(Rc::new(PowersetInner {
            alias: Some(alias),
            base,
        }))
    }

    pub fn nameless(base: Type) -> Powerset {
        Powerset(Rc::new(PowersetInner { alias: None, base }))
    }

    pub fn alias(&self) -> Option<char> {
        self.0.alias
    }

    pub fn base(&self) -> &Type {
        &self.0.base
    }
}

/// A type: one atom (primitive or powerset) or a signature of atoms.
///
/// A [`Type::Signature`] never holds exactly one atom; such signatures
/// collapse to the atom itself.
#[derive(Clone)]
pub enum Type {
    Primitive(Primitive),
    Powerset(Powerset),
    Signature(Rc<[Type]>),
}

impl Type {
    /// Builds a type from a sequence of atoms, collapsing single atoms.
    pub fn from_atoms(atoms: Vec<Type>) -> Type {
        debug_assert!(atoms.iter().all(|atom| !matches!(atom, Type::Signature(_))));
        if atoms.len() == 1 {
            atoms.into_iter().next().expect("length checked above")
        } else {
            Type::Signature(atoms.into())
        }
    }

    /// Concatenates the atoms of all given types into one type.
    pub fn join<'a>(types: impl IntoIterator<Item = &'a Type>) -> Type {
        let atoms = types
            .into_iter()
            .flat_map(|ty| ty.atoms().iter().cloned())
            .collect();
        Type::from_atoms(atoms)
    }

    /// The atoms this type is made of; an atom is made of itself.
    pub fn atoms(&self) -> &[Type] {
        match self {
            Type::Signature(atoms) => atoms,
            atom => std::slice::from_ref(atom),
        }
    }

    /// The number of atoms, i.e. the number of values of this type.
    pub fn len(&self) -> usize {
        self.atoms().len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms().is_empty()
    }

    pub fn is_signature(&self) -> bool {
        matches!(self, Type::Signature(_))
    }

    /// Whether this is a powerset without a declared alias.
    pub fn is_nameless(&self) -> bool {
        matches!(self, Type::Powerset(p) if p.alias().is_none())
    }

    pub fn as_powerset(&self) -> Option<&Powerset> {
        match self {
            Type::Powerset(p) => Some(p),
            _ => None,
        }
    }

    /// The runtime representation of an atom. Signatures have none.
    pub fn repr(&self) -> Option<Repr> {
        match self {
            Type::Primitive(p) => Some(p.repr()),
            Type::Powerset(_) => Some(Repr::Callable),
            Type::Signature(_) => None,
        }
    }

    /// The exact display alias: the expanded letters of a signature, the
    /// letter of an atom, or nothing for nameless powersets.
    pub fn alias(&self) -> String {
        match self {
            Type::Primitive(p) => p.alias().to_string(),
            Type::Powerset(p) => p.alias().map(String::from).unwrap_or_default(),
            Type::Signature(atoms) => atoms.iter().map(Type::alias).collect(),
        }
    }

    /// The structural identity used by every compatibility check.
    pub fn comparable(&self) -> Comparable {
        match self {
            Type::Primitive(p) => Comparable::Primitive(p.alias()),
            Type::Powerset(p) => Comparable::Boxed(Box::new(p.base().comparable())),
            Type::Signature(atoms) => {
                Comparable::Sequence(atoms.iter().map(Type::comparable).collect())
            }
        }
    }

    /// Human-readable form used in diagnostics.
    pub fn pretty(&self) -> String {
        match self {
            Type::Primitive(p) => format!("{}: {{\\{}}}", p.alias(), p.repr()),
            Type::Powerset(p) => match p.alias() {
                Some(alias) => format!("{alias}: {{{}}}", p.base().compact()),
                None => format!("{{{}}}", p.base().compact()),
            },
            Type::Signature(_) => self.compact(),
        }
    }

    fn compact(&self) -> String {
        match self {
            Type::Primitive(p) => p.alias().to_string(),
            Type::Powerset(p) => match p.alias() {
                Some(alias) => alias.to_string(),
                None => format!("{{{}}}", p.base().compact()),
            },
            Type::Signature(atoms) if atoms.is_empty() => "{}".to_string(),
            Type::Signature(atoms) => atoms.iter().map(Type::compact).collect(),
        }
    }
}

/// Two types are identical when both their alias and structure agree.
impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.alias() == other.alias() && self.comparable() == other.comparable()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty())
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.pretty())
    }
}

/// Structural key of a type, free of display aliases.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Comparable {
    Primitive(char),
    Sequence(Vec<Comparable>),
    Boxed(Box<Comparable>),
}

impl fmt::Display for Comparable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparable::Primitive(alias) => write!(f, "{{\\{alias}}}"),
            Comparable::Sequence(items) if items.is_empty() => f.write_str("{}"),
            Comparable::Sequence(items) => items.iter().try_for_each(|item| match item {
                Comparable::Primitive(alias) => write!(f, "{alias}"),
                other => write!(f, "{other}"),
            }),
            Comparable::Boxed(inner) => write!(f, "{{{inner}}}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("cannot declare an empty signature")]
    Empty,
    #[error("invalid syntax near '{0}'")]
    InvalidSyntax(String),
    #[error("primitive {0} is not defined")]
    UndefinedPrimitive(char),
    #[error("repetition count for {0} must be positive")]
    NonPositiveRepeat(char),
    #[error("invalid repetition count after {letter}: {count}")]
    InvalidRepeat { letter: char, count: String },
}

/// Decodes a signature alias such as `RN2` into its atoms (`R`, `N`, `N`).
///
/// The alias grammar is `(Letter Digit*)*`, a trailing count repeating the
/// letter. This is the only place alias text is turned into types.
pub fn parse_atoms(alias: &str, registry: &TypeRegistry) -> Result<Vec<Type>, SignatureError> {
    if alias.is_empty() {
        return Err(SignatureError::Empty);
    }
    let mut atoms = Vec::with_capacity(alias.len());
    let mut rest = alias;
    while let Some(letter) = rest.chars().next() {
        if !letter.is_ascii_alphabetic() {
            return Err(SignatureError::InvalidSyntax(rest.to_string()));
        }
        rest = &rest[1..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (count, tail) = rest.split_at(digits);
        rest = tail;

        let atom = registry
            .get(letter)
            .ok_or(SignatureError::UndefinedPrimitive(letter))?;
        let n = if count.is_empty() {
            1
        } else {
            let n: usize = count.parse().map_err(|_| SignatureError::InvalidRepeat {
                letter,
                count: count.to_string(),
            })?;
            if n == 0 {
                return Err(SignatureError::NonPositiveRepeat(letter));
            }
            n
        };
        atoms.extend(std::iter::repeat(atom).take(n));
    }
    Ok(atoms)
}

/// Decodes a signature alias, collapsing a single atom to itself.
pub fn parse_signature(alias: &str, registry: &TypeRegistry) -> Result<Type, SignatureError> {
    parse_atoms(alias, registry).map(Type::from_atoms)
}
