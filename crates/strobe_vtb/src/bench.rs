//! The virtual testbench.
//!
//! [`VirtualBench`] is a [`SimHost`] backed by the [`SignalStore`]: it lays
//! out the same signal topology the RTL harness would provide and reproduces
//! its behavior in process. Writes to pin registers re-resolve the pin's
//! driver onto the device net, a rising compare enable checks the net
//! against the expected value, and a rising capture enable shifts the net's
//! level into the pin's capture memory. Scheduled actions sit in a time
//! wheel and come back out of [`advance`](SimHost::advance) in time order,
//! first-registered first among ties.

use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use strobe_engine::wave::{FORCE_HIGH, FORCE_LOW};
use strobe_engine::{
    Bit, HostEvent, Miscompare, NetValue, PutMode, ScheduledAction, SignalRef, SimHost,
    RECEIVED_UNKNOWN,
};

use crate::signal::{SignalKind, SignalStore};

/// Shape of the bench to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Scope all bench signals live under.
    pub top: String,
    /// Pin names to build harness signals and device nets for. Names must
    /// be unique.
    pub pins: Vec<String>,
    /// Exponent of the simulation time unit.
    pub timescale: i32,
    /// Width of each pin's capture memory, in bits.
    pub capture_width: usize,
    /// Extra registers to lay out beside the pin topology, addressable by
    /// their full path through peek and poke.
    #[serde(default)]
    pub nets: Vec<NetDef>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        BenchConfig {
            top: "bench".to_string(),
            pins: Vec::new(),
            timescale: -12,
            capture_width: 32,
            nets: Vec::new(),
        }
    }
}

/// One extra register in the bench.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetDef {
    /// Full hierarchical path of the register.
    pub name: String,
    /// Width in bits.
    pub width: usize,
}

/// Which harness register a signal handle is, within its pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PinRole {
    Data,
    Drive,
    ForceData,
    Compare,
    Capture,
    Dut,
}

/// Resolved handles for one pin's harness signals and device net.
#[derive(Debug, Clone)]
struct PinSignals {
    name: String,
    data: SignalRef,
    drive: SignalRef,
    force_data: SignalRef,
    compare: SignalRef,
    capture: SignalRef,
    sync_memory: SignalRef,
    dut: SignalRef,
}

/// A scheduled action in the wheel, ordered by due time then registration.
#[derive(Debug, Clone, Copy)]
struct Slot {
    due: u64,
    seq: u64,
    action: ScheduledAction,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        (self.due, self.seq) == (other.due, other.seq)
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

/// An in-process stand-in for the RTL test harness.
pub struct VirtualBench {
    store: SignalStore,
    pins: Vec<PinSignals>,
    roles: BTreeMap<SignalRef, (usize, PinRole)>,
    wheel: std::collections::BinaryHeap<std::cmp::Reverse<Slot>>,
    now: u64,
    seq: u64,
    reports: VecDeque<Miscompare>,
    log_buffer: Vec<String>,
    timescale: i32,
}

impl VirtualBench {
    /// Builds the bench: per-pin harness registers, device nets, and the
    /// shared finish/sync/debug signals.
    pub fn new(config: BenchConfig) -> Self {
        let mut store = SignalStore::new();
        let mut pins = Vec::with_capacity(config.pins.len());
        let mut roles = BTreeMap::new();
        let top = &config.top;

        for (index, name) in config.pins.iter().enumerate() {
            let base = format!("{top}.pins.{name}");
            let pin = PinSignals {
                name: name.clone(),
                data: store.define(&format!("{base}.data"), SignalKind::Register, 1),
                drive: store.define(&format!("{base}.drive"), SignalKind::Register, 1),
                force_data: store.define(&format!("{base}.force_data"), SignalKind::Register, 2),
                compare: store.define(&format!("{base}.compare"), SignalKind::Register, 1),
                capture: store.define(&format!("{base}.capture"), SignalKind::Register, 1),
                sync_memory: store.define(
                    &format!("{base}.sync_memory"),
                    SignalKind::Register,
                    config.capture_width,
                ),
                dut: store.define(&format!("{top}.dut.{name}"), SignalKind::Net, 1),
            };
            roles.insert(pin.data, (index, PinRole::Data));
            roles.insert(pin.drive, (index, PinRole::Drive));
            roles.insert(pin.force_data, (index, PinRole::ForceData));
            roles.insert(pin.compare, (index, PinRole::Compare));
            roles.insert(pin.capture, (index, PinRole::Capture));
            roles.insert(pin.dut, (index, PinRole::Dut));
            pins.push(pin);
        }

        store.define(&format!("{top}.finish"), SignalKind::Register, 1);
        store.define(&format!("{top}.pins.sync"), SignalKind::Register, 1);
        store.define(&format!("{top}.debug.errors"), SignalKind::Register, 32);
        store.define(&format!("{top}.debug.match_errors"), SignalKind::Register, 32);
        store.define(&format!("{top}.debug.pattern"), SignalKind::Register, 1);
        store.define(&format!("{top}.debug.comments"), SignalKind::Register, 1);

        for net in &config.nets {
            store.define(&net.name, SignalKind::Register, net.width);
        }

        VirtualBench {
            store,
            pins,
            roles,
            wheel: std::collections::BinaryHeap::new(),
            now: 0,
            seq: 0,
            reports: VecDeque::new(),
            log_buffer: Vec::new(),
            timescale: config.timescale,
        }
    }

    /// Current simulation time.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Read a signal by its full path.
    pub fn value_of(&self, path: &str) -> Option<NetValue> {
        self.store.resolve(path).map(|signal| self.store.value(signal))
    }

    /// Read a text payload by its full path.
    pub fn text_of(&self, path: &str) -> Option<String> {
        self.store
            .resolve(path)
            .and_then(|signal| self.store.get(signal))
            .map(|entry| entry.text.clone())
    }

    /// Everything logged through the host so far.
    pub fn log_lines(&self) -> &[String] {
        &self.log_buffer
    }

    /// The underlying signal store.
    pub fn store(&self) -> &SignalStore {
        &self.store
    }

    fn put_value(&mut self, signal: SignalRef, value: NetValue, mode: PutMode) {
        let old = self.store.value(signal);
        self.store.write(signal, value, mode);
        self.react(signal, &old, mode);
    }

    /// Applies the bench's reactive rules after a write.
    fn react(&mut self, signal: SignalRef, old: &NetValue, mode: PutMode) {
        let Some(&(pin, role)) = self.roles.get(&signal) else {
            return;
        };
        let new = self.store.value(signal);
        match role {
            PinRole::Data | PinRole::ForceData => {
                if self.store.level(self.pins[pin].drive) == Bit::One {
                    self.evaluate_driver(pin);
                }
            }
            PinRole::Drive => {
                let was_on = old.bit(0) == Bit::One;
                let is_on = new.bit(0) == Bit::One;
                if was_on != is_on {
                    self.evaluate_driver(pin);
                }
            }
            PinRole::Compare => {
                if old.bit(0) != Bit::One && new.bit(0) == Bit::One {
                    self.check_compare(pin);
                }
            }
            PinRole::Capture => {
                if old.bit(0) != Bit::One && new.bit(0) == Bit::One {
                    self.capture_bit(pin);
                }
            }
            PinRole::Dut => {
                // A released net falls back to whatever the pin drives.
                if mode == PutMode::Release {
                    self.evaluate_driver(pin);
                }
            }
        }
    }

    /// Re-resolves a pin's driver onto its device net.
    fn evaluate_driver(&mut self, pin: usize) {
        let (data, drive, force_data, dut) = {
            let p = &self.pins[pin];
            (p.data, p.drive, p.force_data, p.dut)
        };
        let out = if self.store.level(drive) == Bit::One {
            match self.store.value(force_data).to_u64() {
                Some(FORCE_LOW) => NetValue::from_u64(0, 1),
                Some(FORCE_HIGH) => NetValue::from_u64(1, 1),
                _ => NetValue::from_bits(vec![self.store.level(data)]),
            }
        } else {
            NetValue::from_bits(vec![Bit::Z])
        };
        self.store.write(dut, out, PutMode::Immediate);
    }

    /// Samples the device net against the expected level and queues a
    /// miscompare on disagreement. An undefined net never matches.
    fn check_compare(&mut self, pin: usize) {
        let (data, dut, name) = {
            let p = &self.pins[pin];
            (p.data, p.dut, p.name.clone())
        };
        let expected = u8::from(self.store.level(data) == Bit::One);
        let received = self.store.level(dut);
        let report = match received {
            Bit::Zero | Bit::One => {
                let got = i64::from(received == Bit::One);
                if got == i64::from(expected) {
                    None
                } else {
                    Some(Miscompare { pin: name, expected, received: got })
                }
            }
            Bit::X | Bit::Z => {
                Some(Miscompare { pin: name, expected, received: RECEIVED_UNKNOWN })
            }
        };
        if let Some(report) = report {
            tracing::debug!(pin = %report.pin, received = report.received, "miscompare detected");
            self.reports.push_back(report);
        }
    }

    /// Shifts the device net's level into the pin's capture memory.
    fn capture_bit(&mut self, pin: usize) {
        let (dut, sync_memory) = {
            let p = &self.pins[pin];
            (p.dut, p.sync_memory)
        };
        let sampled = self.store.level(dut);
        let old = self.store.value(sync_memory);
        let width = old.width();
        let mut bits = Vec::with_capacity(width);
        bits.push(sampled);
        for i in 0..width.saturating_sub(1) {
            bits.push(old.bit(i));
        }
        self.store.write(sync_memory, NetValue::from_bits(bits), PutMode::Immediate);
    }
}

impl SimHost for VirtualBench {
    fn lookup(&mut self, path: &str) -> Option<SignalRef> {
        self.store.resolve(path)
    }

    fn put_int(&mut self, signal: SignalRef, value: u64, mode: PutMode) {
        let width = self.store.value(signal).width();
        self.put_value(signal, NetValue::from_u64(value, width), mode);
    }

    fn put_dec(&mut self, signal: SignalRef, digits: &str, mode: PutMode) {
        match digits.parse::<u64>() {
            Ok(value) => self.put_int(signal, value, mode),
            Err(_) => {
                let width = self.store.value(signal).width();
                tracing::warn!(digits, "undecodable decimal value, writing unknown");
                self.put_value(signal, NetValue::unknown(width), mode);
            }
        }
    }

    fn put_text(&mut self, signal: SignalRef, text: &str) {
        self.store.set_text(signal, text);
    }

    fn get(&mut self, signal: SignalRef) -> NetValue {
        self.store.value(signal)
    }

    fn schedule_after(&mut self, delay: u64, action: ScheduledAction) {
        self.wheel.push(std::cmp::Reverse(Slot {
            due: self.now + delay,
            seq: self.seq,
            action,
        }));
        self.seq += 1;
    }

    fn advance(&mut self) -> Option<HostEvent> {
        if let Some(report) = self.reports.pop_front() {
            return Some(HostEvent::Miscompare(report));
        }
        let std::cmp::Reverse(slot) = self.wheel.pop()?;
        self.now = slot.due;
        Some(HostEvent::Action(slot.action))
    }

    fn timescale(&self) -> i32 {
        self.timescale
    }

    fn flush(&mut self) {}

    fn log(&mut self, message: &str) {
        tracing::info!(target: "sim", "{message}");
        self.log_buffer.push(message.to_string());
    }
}
