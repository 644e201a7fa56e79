//! Flat signal storage with hierarchical names.

use std::collections::BTreeMap;

use strobe_engine::{Bit, NetValue, PutMode, SignalRef};

/// Hardware flavor of a stored signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// Holds its value between writes; initializes to zero.
    Register,
    /// Resolves from its drivers; initializes to unknown.
    Net,
}

/// One stored signal.
#[derive(Debug, Clone)]
pub struct Signal {
    /// Full hierarchical name.
    pub name: String,
    /// Register or net.
    pub kind: SignalKind,
    /// Current four-state value.
    pub value: NetValue,
    /// `true` while a force overrides ordinary writes.
    pub forced: bool,
    /// Text payload for signals used as string carriers.
    pub text: String,
}

/// Name-addressed storage for every signal in a bench.
///
/// Handles are dense indices into the definition order; a handle stays valid
/// for the life of the store.
#[derive(Debug, Default)]
pub struct SignalStore {
    names: BTreeMap<String, u32>,
    signals: Vec<Signal>,
}

impl SignalStore {
    /// An empty store.
    pub fn new() -> Self {
        SignalStore::default()
    }

    /// Defines a signal and returns its handle.
    ///
    /// Redefining a name returns the existing handle unchanged.
    pub fn define(&mut self, name: &str, kind: SignalKind, width: usize) -> SignalRef {
        if let Some(&raw) = self.names.get(name) {
            return SignalRef::from_raw(raw);
        }
        let raw = self.signals.len() as u32;
        let value = match kind {
            SignalKind::Register => NetValue::zeros(width),
            SignalKind::Net => NetValue::unknown(width),
        };
        self.signals.push(Signal {
            name: name.to_string(),
            kind,
            value,
            forced: false,
            text: String::new(),
        });
        self.names.insert(name.to_string(), raw);
        SignalRef::from_raw(raw)
    }

    /// Resolves a name to its handle.
    pub fn resolve(&self, name: &str) -> Option<SignalRef> {
        self.names.get(name).map(|&raw| SignalRef::from_raw(raw))
    }

    /// The signal behind a handle.
    pub fn get(&self, signal: SignalRef) -> Option<&Signal> {
        self.signals.get(signal.as_raw() as usize)
    }

    /// Current value of a signal; all-X for a stale handle.
    pub fn value(&self, signal: SignalRef) -> NetValue {
        match self.get(signal) {
            Some(entry) => entry.value.clone(),
            None => NetValue::unknown(1),
        }
    }

    /// Single-bit view of a signal, bit 0.
    pub fn level(&self, signal: SignalRef) -> Bit {
        self.value(signal).bit(0)
    }

    /// Writes a value, honoring force semantics.
    ///
    /// Immediate writes are dropped while the signal is forced. A force
    /// write overrides and pins the value; a release only clears the pin,
    /// leaving the caller to restore whatever should now drive the signal.
    pub fn write(&mut self, signal: SignalRef, value: NetValue, mode: PutMode) {
        let Some(entry) = self.signals.get_mut(signal.as_raw() as usize) else {
            return;
        };
        match mode {
            PutMode::Immediate => {
                if !entry.forced {
                    entry.value = value;
                }
            }
            PutMode::Force => {
                entry.value = value;
                entry.forced = true;
            }
            PutMode::Release => {
                entry.forced = false;
            }
        }
    }

    /// Stores a text payload on a signal.
    pub fn set_text(&mut self, signal: SignalRef, text: &str) {
        if let Some(entry) = self.signals.get_mut(signal.as_raw() as usize) {
            entry.text = text.to_string();
        }
    }

    /// Number of defined signals.
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// `true` when nothing is defined.
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}
