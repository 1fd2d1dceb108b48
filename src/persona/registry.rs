//! Persona registry: an ordered, persisted list of personas.
//!
//! Readers take an `Arc` snapshot and never observe a partial update.
//! Writers are serialized, build the next list off to the side, persist it,
//! and only then swap it in.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::{Error, Result};

use super::store::PersonaStore;
use super::types::Persona;

pub struct PersonaRegistry {
    current: RwLock<Arc<Vec<Persona>>>,
    writer: Mutex<()>,
    store: Box<dyn PersonaStore>,
}

impl PersonaRegistry {
    /// Load from `store`, seeding and persisting the default personas if
    /// the store is empty.
    pub fn load_or_seed(store: Box<dyn PersonaStore>) -> Result<Self> {
        let personas = match store.load()? {
            Some(personas) => checked(personas)?,
            None => {
                let defaults = Persona::defaults();
                store.save(&defaults)?;
                info!(store = %store.describe(), count = defaults.len(), "Seeded default personas");
                defaults
            }
        };

        Ok(Self {
            current: RwLock::new(Arc::new(personas)),
            writer: Mutex::new(()),
            store,
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────

    /// Shared handle to the current list.
    pub fn snapshot(&self) -> Arc<Vec<Persona>> {
        Arc::clone(&self.current.read())
    }

    /// Ordered copy of the current list.
    pub fn list(&self) -> Vec<Persona> {
        self.snapshot().as_ref().clone()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Persona at `index`.
    pub fn get(&self, index: usize) -> Result<Persona> {
        let snap = self.snapshot();
        snap.get(index).cloned().ok_or(Error::PersonaNotFound {
            index,
            len: snap.len(),
        })
    }

    /// Persona with exactly this (trimmed) name.
    pub fn find(&self, name: &str) -> Option<Persona> {
        let name = name.trim();
        self.snapshot().iter().find(|p| p.name == name).cloned()
    }

    // ─────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────

    /// Append a persona.
    pub fn add(&self, name: &str, style: &str) -> Result<Persona> {
        let persona = Persona::validated(name, style)?;
        let _guard = self.writer.lock();

        let current = self.snapshot();
        if current.iter().any(|p| p.name == persona.name) {
            return Err(Error::validation(
                "name",
                format!("a persona named '{}' already exists", persona.name),
            ));
        }

        let mut next = current.as_ref().clone();
        next.push(persona.clone());
        self.commit(next)?;

        info!(name = %persona.name, "Persona added");
        Ok(persona)
    }

    /// Replace the persona at `index`.
    pub fn update(&self, index: usize, name: &str, style: &str) -> Result<Persona> {
        let _guard = self.writer.lock();

        let current = self.snapshot();
        if index >= current.len() {
            return Err(Error::PersonaNotFound {
                index,
                len: current.len(),
            });
        }

        let persona = Persona::validated(name, style)?;
        let collides = current
            .iter()
            .enumerate()
            .any(|(i, p)| i != index && p.name == persona.name);
        if collides {
            return Err(Error::validation(
                "name",
                format!("a persona named '{}' already exists", persona.name),
            ));
        }

        let mut next = current.as_ref().clone();
        next[index] = persona.clone();
        self.commit(next)?;

        info!(index, name = %persona.name, "Persona updated");
        Ok(persona)
    }

    /// Remove the persona at `index`, returning it.
    pub fn delete(&self, index: usize) -> Result<Persona> {
        let _guard = self.writer.lock();

        let current = self.snapshot();
        if index >= current.len() {
            return Err(Error::PersonaNotFound {
                index,
                len: current.len(),
            });
        }

        let mut next = current.as_ref().clone();
        let removed = next.remove(index);
        self.commit(next)?;

        info!(index, name = %removed.name, "Persona deleted");
        Ok(removed)
    }

    /// Persist `next`, then publish it. Caller holds the writer lock.
    fn commit(&self, next: Vec<Persona>) -> Result<()> {
        if let Err(e) = self.store.save(&next) {
            warn!(store = %self.store.describe(), error = %e, "Failed to persist personas");
            return Err(e);
        }
        *self.current.write() = Arc::new(next);
        Ok(())
    }
}

/// Re-validate a stored list: trimmed non-empty fields, unique names.
fn checked(stored: Vec<Persona>) -> Result<Vec<Persona>> {
    let mut personas: Vec<Persona> = Vec::with_capacity(stored.len());
    for (index, p) in stored.iter().enumerate() {
        let persona = Persona::validated(&p.name, &p.style).map_err(|_| {
            Error::validation("store", format!("entry {}: name and style must not be empty", index))
        })?;
        if personas.iter().any(|existing| existing.name == persona.name) {
            return Err(Error::validation(
                "store",
                format!("entry {}: duplicate name '{}'", index, persona.name),
            ));
        }
        personas.push(persona);
    }
    Ok(personas)
}

impl std::fmt::Debug for PersonaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersonaRegistry")
            .field("personas", &self.len())
            .field("store", &self.store.describe())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
