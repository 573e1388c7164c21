//! Standard `spectest` host module and host reference table.
//!
//! The host stub provides the fixed imports that spec test modules expect
//! under the reserved namespace: `hostref`/`eq_ref` for reference identity
//! tests, no-op print functions, globals initialised to 666, a funcref table
//! (10 min, 20 max) and a memory (1 page min, 2 max).
//!
//! Host references are cached per tag in [`HostRefs`], which lives in the
//! store's [`HostState`]: the first request for a tag allocates an
//! `externref`, and every later request returns the same reference.

use super::registry::Bindings;
use std::collections::HashMap;
use std::fmt;
use wasmtime::{
    AsContextMut, Caller, ExternRef, Func, Global, GlobalType, ManuallyRooted, Memory, MemoryType, Mutability, Ref,
    RefType, Rooted, Store, Table, TableType, Val, ValType,
};

/// Host payload of an `externref` produced by `hostref(tag)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostRef(pub u32);

impl fmt::Display for HostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hostref({})", self.0)
    }
}

/// Tag-keyed table of host references.
///
/// Entries are inserted on first use and never evicted, so a tag maps to
/// the same reference for the lifetime of the store.
#[derive(Default)]
pub struct HostRefs {
    refs: HashMap<u32, ManuallyRooted<ExternRef>>,
}

impl HostRefs {
    /// Number of distinct tags allocated so far.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Whether a reference has been allocated for `tag`.
    pub fn contains(&self, tag: u32) -> bool {
        self.refs.contains_key(&tag)
    }
}

impl fmt::Debug for HostRefs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.refs.keys().collect();
        tags.sort();
        f.debug_struct("HostRefs").field("tags", &tags).finish()
    }
}

/// Per-store host data.
#[derive(Debug, Default)]
pub struct HostState {
    pub host_refs: HostRefs,
}

/// The `externref` for `tag`, allocating it on first use.
pub fn host_ref(mut store: impl AsContextMut<Data = HostState>, tag: u32) -> anyhow::Result<Rooted<ExternRef>> {
    let mut store = store.as_context_mut();

    // Rooting needs the store mutably, so the entry is lifted out while it
    // is re-rooted and then put back.
    if let Some(cached) = store.data_mut().host_refs.refs.remove(&tag) {
        let rooted = cached.to_rooted(&mut store);
        store.data_mut().host_refs.refs.insert(tag, cached);
        return Ok(rooted);
    }

    let created = ExternRef::new(&mut store, HostRef(tag))?;
    let pinned = created.to_manually_rooted(&mut store)?;
    store.data_mut().host_refs.refs.insert(tag, pinned);
    log::debug!("allocated {}", HostRef(tag));
    Ok(created)
}

/// Allocate the host stub's exports in `store`.
///
/// Globals are `i32`/`i64` = 666 and `f32`/`f64` = 666.6, matching the
/// reference spectest module.
pub fn create_spectest_bindings(store: &mut Store<HostState>) -> anyhow::Result<Bindings> {
    let mut bindings = Bindings::new();

    let hostref = Func::wrap(
        &mut *store,
        |mut caller: Caller<'_, HostState>, tag: i32| -> anyhow::Result<Option<Rooted<ExternRef>>> {
            host_ref(&mut caller, tag as u32).map(Some)
        },
    );
    bindings.insert("hostref", hostref);

    let eq_ref = Func::wrap(
        &mut *store,
        |caller: Caller<'_, HostState>,
         a: Option<Rooted<ExternRef>>,
         b: Option<Rooted<ExternRef>>|
         -> anyhow::Result<i32> {
            let equal = match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => Rooted::<ExternRef>::ref_eq(&caller, &a, &b)?,
                _ => false,
            };
            Ok(equal as i32)
        },
    );
    bindings.insert("eq_ref", eq_ref);

    bindings.insert("print", Func::wrap(&mut *store, || log::info!("spectest print")));
    bindings.insert(
        "print_i32",
        Func::wrap(&mut *store, |v: i32| log::info!("spectest print_i32: {v}")),
    );
    bindings.insert(
        "print_i64",
        Func::wrap(&mut *store, |v: i64| log::info!("spectest print_i64: {v}")),
    );
    bindings.insert(
        "print_f32",
        Func::wrap(&mut *store, |v: f32| log::info!("spectest print_f32: {v}")),
    );
    bindings.insert(
        "print_f64",
        Func::wrap(&mut *store, |v: f64| log::info!("spectest print_f64: {v}")),
    );
    bindings.insert(
        "print_i32_f32",
        Func::wrap(&mut *store, |a: i32, b: f32| log::info!("spectest print_i32_f32: {a} {b}")),
    );
    bindings.insert(
        "print_f64_f64",
        Func::wrap(&mut *store, |a: f64, b: f64| log::info!("spectest print_f64_f64: {a} {b}")),
    );

    let globals = [
        ("global_i32", ValType::I32, Val::I32(666)),
        ("global_i64", ValType::I64, Val::I64(666)),
        ("global_f32", ValType::F32, Val::F32(666.6f32.to_bits())),
        ("global_f64", ValType::F64, Val::F64(666.6f64.to_bits())),
    ];
    for (name, ty, value) in globals {
        let global = Global::new(&mut *store, GlobalType::new(ty, Mutability::Const), value)?;
        bindings.insert(name, global);
    }

    let table = Table::new(&mut *store, TableType::new(RefType::FUNCREF, 10, Some(20)), Ref::Func(None))?;
    bindings.insert("table", table);

    let memory = Memory::new(&mut *store, MemoryType::new(1, Some(2)))?;
    bindings.insert("memory", memory);

    Ok(bindings)
}
