//! Foreign type registry
//!
//! Maps native type declarations to stable [`TypeId`]s and keeps the method
//! table bound to each type. One registry is shared (through an `Arc`) by
//! every runtime instance of a process:
//!
//! - lookups take a read lock and may run concurrently from any instance
//! - registrations take the write lock, resolve against a scratch copy of the
//!   tables and publish it only when the whole call succeeded, so a failed
//!   call leaves no partial state behind

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::context::ScriptStack;
use crate::ctype::{self, AggKind, BaseType, Decl, Derived, Prim, TypeName};
use crate::error::{MarshalError, MarshalResult};
use crate::methods::MethodTable;
use crate::value::NativeFn;

const POINTER_SIZE: usize = std::mem::size_of::<usize>();

/// Stable per-process identifier of a registered native type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    /// void
    pub const VOID: TypeId = TypeId(1);
    /// bool
    pub const BOOL: TypeId = TypeId(2);
    /// int8_t
    pub const INT8: TypeId = TypeId(3);
    /// uint8_t
    pub const UINT8: TypeId = TypeId(4);
    /// int16_t
    pub const INT16: TypeId = TypeId(5);
    /// uint16_t
    pub const UINT16: TypeId = TypeId(6);
    /// int32_t
    pub const INT32: TypeId = TypeId(7);
    /// uint32_t
    pub const UINT32: TypeId = TypeId(8);
    /// int64_t, the reserved signed wide integer type
    pub const INT64: TypeId = TypeId(9);
    /// uint64_t, the reserved unsigned wide integer type
    pub const UINT64: TypeId = TypeId(10);
    /// float
    pub const FLOAT: TypeId = TypeId(11);
    /// double
    pub const DOUBLE: TypeId = TypeId(12);
    /// char
    pub const CHAR: TypeId = TypeId(13);
    /// void *
    pub const VOID_PTR: TypeId = TypeId(14);
    /// char *
    pub const CHAR_PTR: TypeId = TypeId(15);
    /// const char *
    pub const CONST_CHAR_PTR: TypeId = TypeId(16);

    /// Raw identifier
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctype#{}", self.0)
    }
}

/// Named member of an aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Member name
    pub name: String,
    /// Member type
    pub type_id: TypeId,
    /// Byte offset from the start of the aggregate
    pub offset: usize,
}

/// Shape of a registered type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CKind {
    /// void
    Void,
    /// bool
    Bool,
    /// plain char
    Char,
    /// Integer
    Int {
        /// Signedness
        signed: bool,
    },
    /// float or double
    Float,
    /// Pointer
    Pointer {
        /// Pointee type
        pointee: TypeId,
        /// Pointee is const-qualified
        pointee_const: bool,
    },
    /// Fixed-size array
    Array {
        /// Element type
        elem: TypeId,
        /// Element count
        len: u64,
    },
    /// struct or union; `fields` is `None` while incomplete
    Aggregate {
        /// struct or union
        kind: AggKind,
        /// Members
        fields: Option<Vec<Field>>,
    },
}

/// A registered native type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CType {
    name: String,
    kind: CKind,
    size: Option<usize>,
    align: usize,
}

impl CType {
    /// Canonical type name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type shape
    pub fn kind(&self) -> &CKind {
        &self.kind
    }

    /// Size in bytes; `None` for incomplete types and void
    pub fn size(&self) -> Option<usize> {
        self.size
    }

    /// Alignment in bytes
    pub fn align(&self) -> usize {
        self.align
    }

    /// Integer signedness, for integer types
    pub fn integer_signedness(&self) -> Option<bool> {
        match self.kind {
            CKind::Int { signed } => Some(signed),
            _ => None,
        }
    }

    /// Whether this is a pointer type
    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, CKind::Pointer { .. })
    }
}

/// Registry limits
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of distinct TypeIds
    pub max_types: usize,
}

/// Default TypeId capacity
pub const DEFAULT_MAX_TYPES: usize = 65536;

/// Largest size in bytes of any complete type
pub const MAX_TYPE_SIZE: usize = 0x7fff_ff00;

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_types: DEFAULT_MAX_TYPES,
        }
    }
}

#[derive(Clone)]
struct Tables {
    types: Vec<CType>,
    by_name: FxHashMap<String, TypeId>,
    typedefs: FxHashMap<String, TypeId>,
    descriptors: FxHashMap<String, TypeId>,
    methods: FxHashMap<TypeId, Arc<MethodTable>>,
    anonymous: u32,
    max_types: usize,
}

/// Process-wide table of foreign types and their method tables.
pub struct TypeRegistry {
    tables: RwLock<Tables>,
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("TypeRegistry")
            .field("types", &tables.types.len())
            .field("method_tables", &tables.methods.len())
            .finish()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl TypeRegistry {
    /// Create a registry holding the reserved primitive types
    pub fn new(config: RegistryConfig) -> Self {
        let mut tables = Tables {
            types: Vec::new(),
            by_name: FxHashMap::default(),
            typedefs: FxHashMap::default(),
            descriptors: FxHashMap::default(),
            methods: FxHashMap::default(),
            anonymous: 0,
            max_types: usize::MAX,
        };
        tables.install_reserved();
        tables.max_types = config.max_types.max(tables.types.len());
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Create a shared registry
    pub fn shared(config: RegistryConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// TypeId of a type descriptor, registering it on first use.
    ///
    /// The same descriptor always yields the same TypeId.
    pub fn ctypeid(&self, descriptor: &str) -> MarshalResult<TypeId> {
        let key = normalize(descriptor);
        if let Some(&id) = self.tables.read().descriptors.get(&key) {
            return Ok(id);
        }

        let ty = ctype::parse_type_name(descriptor)?;
        self.update(|tables| {
            if let Some(&id) = tables.descriptors.get(&key) {
                return Ok(id);
            }
            let id = tables.resolve(&ty)?;
            tables.descriptors.insert(key, id);
            Ok(id)
        })
    }

    /// Extend the known declarations (struct/union definitions, typedefs).
    pub fn declare(&self, declarations: &str) -> MarshalResult<()> {
        let decls = ctype::parse_declarations(declarations)?;
        self.update(|tables| {
            for decl in &decls {
                match decl {
                    Decl::Aggregate(ty) => {
                        tables.resolve(ty)?;
                    }
                    Decl::Typedef { name, ty } => {
                        let id = tables.resolve(ty)?;
                        match tables.typedefs.get(name) {
                            Some(&existing) if existing != id => {
                                return Err(MarshalError::DescriptorParse(format!(
                                    "attempt to redefine '{}'",
                                    name
                                )))
                            }
                            _ => {
                                tables.typedefs.insert(name.clone(), id);
                            }
                        }
                    }
                }
            }
            Ok(())
        })?;
        tracing::debug!(declarations = decls.len(), "declared native types");
        Ok(())
    }

    /// Resolve `descriptor` and bind `methods` to it as its behaviour set.
    pub fn register_type(&self, descriptor: &str, methods: MethodTable) -> MarshalResult<TypeId> {
        let key = normalize(descriptor);
        let ty = ctype::parse_type_name(descriptor)?;
        let method_count = methods.len();
        let id = self.update(|tables| {
            let id = match tables.descriptors.get(&key) {
                Some(&id) => id,
                None => {
                    let id = tables.resolve(&ty)?;
                    tables.descriptors.insert(key, id);
                    id
                }
            };
            if tables.methods.contains_key(&id) {
                return Err(MarshalError::AlreadyRegistered(tables.get(id).name.clone()));
            }
            tables.methods.insert(id, Arc::new(methods));
            Ok(id)
        })?;
        tracing::debug!(type_id = id.as_u32(), descriptor, method_count, "registered foreign type");
        Ok(id)
    }

    /// Type information for an id
    pub fn ctype(&self, id: TypeId) -> Option<CType> {
        self.with_ctype(id, CType::clone)
    }

    /// Run `f` on the type information for an id without copying it
    pub fn with_ctype<R>(&self, id: TypeId, f: impl FnOnce(&CType) -> R) -> Option<R> {
        let tables = self.tables.read();
        id.0.checked_sub(1)
            .and_then(|i| tables.types.get(i as usize))
            .map(f)
    }

    /// Canonical name of a type
    pub fn name_of(&self, id: TypeId) -> Option<String> {
        self.with_ctype(id, |t| t.name.clone())
    }

    /// Size of a type; `None` when unknown or incomplete
    pub fn size_of(&self, id: TypeId) -> Option<usize> {
        self.with_ctype(id, |t| t.size).flatten()
    }

    /// Method table bound to a type
    pub fn methods(&self, id: TypeId) -> Option<Arc<MethodTable>> {
        self.tables.read().methods.get(&id).cloned()
    }

    /// Method `name` of a type
    pub fn method(&self, id: TypeId, name: &str) -> Option<NativeFn> {
        self.tables.read().methods.get(&id)?.get(name).cloned()
    }

    /// Whether a type's method table has an entry named `name`
    pub fn has_method(&self, id: TypeId, name: &str) -> bool {
        self.tables
            .read()
            .methods
            .get(&id)
            .map_or(false, |m| m.get(name).is_some())
    }

    /// Number of registered types
    pub fn len(&self) -> usize {
        self.tables.read().types.len()
    }

    /// Check if the registry holds no types
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update<T>(&self, f: impl FnOnce(&mut Tables) -> MarshalResult<T>) -> MarshalResult<T> {
        let mut tables = self.tables.write();
        let mut scratch = tables.clone();
        let result = f(&mut scratch)?;
        *tables = scratch;
        Ok(result)
    }
}

fn normalize(descriptor: &str) -> String {
    descriptor.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn align_up(offset: usize, align: usize) -> Option<usize> {
    Some(offset.checked_add(align - 1)? / align * align)
}

fn too_large(name: &str) -> MarshalError {
    MarshalError::DescriptorParse(format!("size of '{}' exceeds {} bytes", name, MAX_TYPE_SIZE))
}

impl Tables {
    fn install_reserved(&mut self) {
        let reserved: [(&str, CKind, Option<usize>, usize); 13] = [
            ("void", CKind::Void, None, 1),
            ("bool", CKind::Bool, Some(1), 1),
            ("int8_t", CKind::Int { signed: true }, Some(1), 1),
            ("uint8_t", CKind::Int { signed: false }, Some(1), 1),
            ("int16_t", CKind::Int { signed: true }, Some(2), 2),
            ("uint16_t", CKind::Int { signed: false }, Some(2), 2),
            ("int32_t", CKind::Int { signed: true }, Some(4), 4),
            ("uint32_t", CKind::Int { signed: false }, Some(4), 4),
            ("int64_t", CKind::Int { signed: true }, Some(8), 8),
            ("uint64_t", CKind::Int { signed: false }, Some(8), 8),
            ("float", CKind::Float, Some(4), 4),
            ("double", CKind::Float, Some(8), 8),
            ("char", CKind::Char, Some(1), 1),
        ];
        for (name, kind, size, align) in reserved {
            self.insert(CType {
                name: name.to_string(),
                kind,
                size,
                align,
            });
        }
        for (pointee, pointee_const) in [
            (TypeId::VOID, false),
            (TypeId::CHAR, false),
            (TypeId::CHAR, true),
        ] {
            let ty = self.pointer_type(pointee, pointee_const);
            self.insert(ty);
        }
        for (name, id) in [
            ("int8_t", TypeId::INT8),
            ("uint8_t", TypeId::UINT8),
            ("int16_t", TypeId::INT16),
            ("uint16_t", TypeId::UINT16),
            ("int32_t", TypeId::INT32),
            ("uint32_t", TypeId::UINT32),
            ("int64_t", TypeId::INT64),
            ("uint64_t", TypeId::UINT64),
            ("size_t", TypeId::UINT64),
            ("uintptr_t", TypeId::UINT64),
            ("ssize_t", TypeId::INT64),
            ("intptr_t", TypeId::INT64),
            ("ptrdiff_t", TypeId::INT64),
        ] {
            self.typedefs.insert(name.to_string(), id);
        }
    }

    fn get(&self, id: TypeId) -> &CType {
        &self.types[id.index()]
    }

    fn intern(&mut self, ty: CType) -> MarshalResult<TypeId> {
        if let Some(&id) = self.by_name.get(&ty.name) {
            return Ok(id);
        }
        if self.types.len() >= self.max_types {
            return Err(MarshalError::RegistryExhaustion(format!(
                "table overflow: cannot add '{}' beyond {} types",
                ty.name, self.max_types
            )));
        }
        Ok(self.insert(ty))
    }

    fn insert(&mut self, ty: CType) -> TypeId {
        let name = ty.name.clone();
        self.types.push(ty);
        let id = TypeId(self.types.len() as u32);
        self.by_name.insert(name, id);
        id
    }

    fn pointer_to(&mut self, pointee: TypeId, pointee_const: bool) -> MarshalResult<TypeId> {
        let ty = self.pointer_type(pointee, pointee_const);
        self.intern(ty)
    }

    fn pointer_type(&self, pointee: TypeId, pointee_const: bool) -> CType {
        let inner = &self.get(pointee).name;
        let name = match (pointee_const, inner.ends_with('*')) {
            (true, true) => format!("{} const *", inner),
            (true, false) => format!("const {} *", inner),
            (false, true) => format!("{}*", inner),
            (false, false) => format!("{} *", inner),
        };
        CType {
            name,
            kind: CKind::Pointer {
                pointee,
                pointee_const,
            },
            size: Some(POINTER_SIZE),
            align: POINTER_SIZE,
        }
    }

    fn prim(prim: Prim) -> TypeId {
        match prim {
            Prim::Void => TypeId::VOID,
            Prim::Bool => TypeId::BOOL,
            Prim::Char => TypeId::CHAR,
            Prim::Float => TypeId::FLOAT,
            Prim::Double => TypeId::DOUBLE,
            Prim::Int { size, signed } => match (size, signed) {
                (1, true) => TypeId::INT8,
                (1, false) => TypeId::UINT8,
                (2, true) => TypeId::INT16,
                (2, false) => TypeId::UINT16,
                (4, true) => TypeId::INT32,
                (4, false) => TypeId::UINT32,
                (_, true) => TypeId::INT64,
                (_, false) => TypeId::UINT64,
            },
        }
    }

    fn resolve(&mut self, ty: &TypeName) -> MarshalResult<TypeId> {
        let mut current = match &ty.base {
            BaseType::Prim(prim) => Self::prim(*prim),
            BaseType::Named(name) => *self.typedefs.get(name).ok_or_else(|| {
                MarshalError::DescriptorParse(format!("undeclared or implicit tag '{}'", name))
            })?,
            BaseType::Aggregate { kind, tag, body } => {
                self.resolve_aggregate(*kind, tag.as_deref(), body.as_deref())?
            }
        };

        let mut current_const = ty.base_const;
        for derived in &ty.derived {
            current = match *derived {
                Derived::Pointer { is_const } => {
                    let id = self.pointer_to(current, current_const)?;
                    current_const = is_const;
                    id
                }
                Derived::Array(len) => {
                    let elem = self.get(current).clone();
                    let elem_size = elem.size.ok_or_else(|| {
                        MarshalError::DescriptorParse(format!(
                            "array of incomplete type '{}'",
                            elem.name
                        ))
                    })?;
                    let name = format!("{} [{}]", elem.name, len);
                    let size = usize::try_from(len)
                        .ok()
                        .and_then(|n| n.checked_mul(elem_size))
                        .filter(|&size| size <= MAX_TYPE_SIZE)
                        .ok_or_else(|| too_large(&name))?;
                    current_const = false;
                    self.intern(CType {
                        name,
                        kind: CKind::Array { elem: current, len },
                        size: Some(size),
                        align: elem.align,
                    })?
                }
            };
        }
        Ok(current)
    }

    fn resolve_aggregate(
        &mut self,
        kind: AggKind,
        tag: Option<&str>,
        body: Option<&[ctype::FieldDecl]>,
    ) -> MarshalResult<TypeId> {
        let name = match tag {
            Some(tag) => format!("{} {}", kind.keyword(), tag),
            None => {
                self.anonymous += 1;
                format!("{} {}", kind.keyword(), self.anonymous)
            }
        };

        let existing = self.by_name.get(&name).copied();
        if let Some(id) = existing {
            if !matches!(self.get(id).kind, CKind::Aggregate { kind: k, .. } if k == kind) {
                return Err(MarshalError::DescriptorParse(format!(
                    "'{}' conflicts with an existing declaration",
                    name
                )));
            }
        }

        let Some(body) = body else {
            return match existing {
                Some(id) => Ok(id),
                None => self.intern(CType {
                    name,
                    kind: CKind::Aggregate { kind, fields: None },
                    size: None,
                    align: 1,
                }),
            };
        };

        let id = match existing {
            Some(id) => id,
            None => self.intern(CType {
                name: name.clone(),
                kind: CKind::Aggregate { kind, fields: None },
                size: None,
                align: 1,
            })?,
        };

        let (fields, size, align) = self.layout(&name, kind, body)?;
        let slot = &mut self.types[id.index()];
        if let CKind::Aggregate { fields: Some(old), .. } = &slot.kind {
            if *old != fields {
                return Err(MarshalError::DescriptorParse(format!(
                    "attempt to redefine '{}'",
                    name
                )));
            }
            return Ok(id);
        }
        slot.kind = CKind::Aggregate {
            kind,
            fields: Some(fields),
        };
        slot.size = Some(size);
        slot.align = align;
        Ok(id)
    }

    fn layout(
        &mut self,
        name: &str,
        kind: AggKind,
        body: &[ctype::FieldDecl],
    ) -> MarshalResult<(Vec<Field>, usize, usize)> {
        let mut fields = Vec::with_capacity(body.len());
        let mut offset = 0;
        let mut size = 0;
        let mut align = 1;
        for decl in body {
            let type_id = self.resolve(&decl.ty)?;
            let member = self.get(type_id);
            let member_size = member.size.ok_or_else(|| {
                MarshalError::DescriptorParse(format!(
                    "member '{}' has incomplete type '{}'",
                    decl.name, member.name
                ))
            })?;
            align = align.max(member.align);
            let member_offset = match kind {
                AggKind::Struct => align_up(offset, member.align).ok_or_else(|| too_large(name))?,
                AggKind::Union => 0,
            };
            offset = member_offset
                .checked_add(member_size)
                .filter(|&end| end <= MAX_TYPE_SIZE)
                .ok_or_else(|| too_large(name))?;
            size = size.max(offset);
            fields.push(Field {
                name: decl.name.clone(),
                type_id,
                offset: member_offset,
            });
        }
        let size = align_up(size, align)
            .filter(|&size| size <= MAX_TYPE_SIZE)
            .ok_or_else(|| too_large(name))?;
        Ok((fields, size, align))
    }
}

// ============================================================================
// Runtime-handle entry points
// ============================================================================

/// TypeId of `descriptor` in the registry of runtime `l`
pub fn ctypeid(l: &dyn ScriptStack, descriptor: &str) -> MarshalResult<TypeId> {
    l.registry().ctypeid(descriptor)
}

/// Extend the declarations known to the registry of runtime `l`
pub fn declare(l: &dyn ScriptStack, declarations: &str) -> MarshalResult<()> {
    l.registry().declare(declarations)
}

/// Register `descriptor` with its method table in the registry of runtime `l`
pub fn register_type(
    l: &dyn ScriptStack,
    descriptor: &str,
    methods: MethodTable,
) -> MarshalResult<TypeId> {
    l.registry().register_type(descriptor, methods)
}
