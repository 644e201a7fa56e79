//! The session state machine.
//!
//! A [`Session`] owns one pattern run: it reads messages from the
//! [`Transport`](crate::transport::Transport), mutates pin and wave state,
//! schedules cycle work into the [`SimHost`], and pumps the host's event
//! stream while simulated time advances. Messages arrive strictly between
//! cycle bursts, so the message loop and the event pump take turns and never
//! interleave.

use serde::{Deserialize, Serialize};

use strobe_protocol::{parse_command, Command, WaveEvent};

use crate::error::BridgeError;
use crate::host::{HostEvent, Miscompare, PutMode, ScheduledAction, SimHost};
use crate::pin::{Pin, PinMode};
use crate::tracker::{ErrorTracker, MAX_TRANSACTION_RECORDS};
use crate::transport::Transport;
use crate::wave::{compare_levels, drive_levels, ActiveSetError, Wave, WaveTable};

/// Handshake line sent as soon as the session starts.
pub const READY: &str = "READY!";

/// Reply to a sync request.
pub const SYNC_ACK: &str = "OK!";

/// Reply to a peek whose net does not exist.
pub const PEEK_FAIL: &str = "FAIL";

/// Period used for the shutdown cycle when none was ever configured.
const SHUTDOWN_PERIOD: u64 = 1000;

/// Startup options for a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Top-level scope the harness signals live under.
    pub testbench_top: String,
    /// Miscompares tolerated before the error breaker trips.
    pub max_errors: u64,
    /// Echo every received message to the host log from the start.
    pub log_messages: bool,
    /// String returned for version requests.
    pub version: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            testbench_top: "bench".to_string(),
            max_errors: 100,
            log_messages: false,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// What a session run amounted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// Cycles executed, including the final shutdown cycle.
    pub cycles: u64,
    /// Total miscompares recorded.
    pub errors: u64,
    /// Miscompares recorded inside the last match loop.
    pub match_errors: u64,
    /// Whether the error breaker tripped.
    pub max_errors_exceeded: bool,
    /// Fatal faults hit while running.
    pub runtime_errors: u32,
    /// `true` when the generator ended the run with its terminal message.
    pub clean: bool,
}

/// What the message loop should do after executing a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Read the next message.
    Continue,
    /// Pump host events until the cycle burst finishes, then read on.
    Cycle,
    /// Shut down and return.
    Complete,
}

/// One pattern-generator session against one simulation.
#[derive(Debug)]
pub struct Session {
    top: String,
    version: String,
    log_messages: bool,
    pins: Vec<Option<Pin>>,
    drive_waves: Vec<Wave>,
    compare_waves: Vec<Wave>,
    period: u64,
    /// Cycles still owed after the one currently running.
    repeat: u64,
    cycle_count: u64,
    runtime_errors: u32,
    tracker: ErrorTracker,
    completed: bool,
}

impl Session {
    /// Creates an idle session.
    ///
    /// Drive wave 0 starts out as the whole-cycle data wave so pins defined
    /// before any wave setup behave like plain drivers.
    pub fn new(config: SessionConfig) -> Self {
        Session {
            top: config.testbench_top,
            version: config.version,
            log_messages: config.log_messages,
            pins: Vec::new(),
            drive_waves: vec![Wave::whole_cycle_drive()],
            compare_waves: vec![Wave::new()],
            period: 0,
            repeat: 0,
            cycle_count: 0,
            runtime_errors: 0,
            tracker: ErrorTracker::new(config.max_errors),
            completed: false,
        }
    }

    /// Runs the session to completion.
    ///
    /// Sends the ready handshake, then serves messages until the generator
    /// completes the pattern or something fatal happens. Either way the
    /// testbench is told to finish and one last cycle runs before this
    /// returns, so waveform dumps always close out cleanly.
    pub fn run(
        &mut self,
        host: &mut dyn SimHost,
        transport: &mut dyn Transport,
    ) -> Result<SessionSummary, BridgeError> {
        tracing::info!(top = %self.top, "session starting");
        if let Err(err) = transport.send_line(READY) {
            return self.fail(host, err.into());
        }
        loop {
            let line = match transport.receive_line() {
                Ok(line) => line,
                Err(err) => {
                    host.log("ERROR: lost connection to the pattern generator");
                    return self.fail(host, err.into());
                }
            };
            if self.log_messages {
                host.log(&format!("[MESSAGE] {line}"));
            }
            let command = match parse_command(&line) {
                Ok(command) => command,
                Err(err) => {
                    host.log(&format!("ERROR: illegal message received: {line}"));
                    return self.fail(host, err.into());
                }
            };
            match self.execute(&command, host, transport) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Cycle) => {
                    if let Err(err) = self.pump(host) {
                        return self.fail(host, err);
                    }
                }
                Ok(Flow::Complete) => {
                    self.completed = true;
                    self.shutdown(host);
                    if let Err(err) = self.pump(host) {
                        tracing::warn!(error = %err, "error while draining the final cycle");
                    }
                    let summary = self.summary();
                    tracing::info!(
                        cycles = summary.cycles,
                        errors = summary.errors,
                        "session complete"
                    );
                    return Ok(summary);
                }
                Err(err) => return self.fail(host, err),
            }
        }
    }

    /// Feeds one externally observed miscompare into the session.
    ///
    /// This is the entry point for hosts that detect failures themselves
    /// rather than delivering them through the event stream. The tracker is
    /// updated and the harness debug counters are refreshed so the generator
    /// can poll them with peeks.
    pub fn report_miscompare(&mut self, host: &mut dyn SimHost, report: &Miscompare) {
        self.tracker
            .record(&report.pin, self.cycle_count, report.expected, report.received);
        tracing::debug!(
            pin = %report.pin,
            cycle = self.cycle_count,
            expected = report.expected,
            received = report.received,
            "miscompare"
        );
        let errors = self.tracker.error_count();
        self.control_put(host, "debug.errors", errors);
        if self.tracker.match_loop_open() {
            let match_errors = self.tracker.match_errors();
            self.control_put(host, "debug.match_errors", match_errors);
        }
    }

    /// Snapshot of the session's outcome so far.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            cycles: self.cycle_count,
            errors: self.tracker.error_count(),
            match_errors: self.tracker.match_errors(),
            max_errors_exceeded: self.tracker.is_degraded(),
            runtime_errors: self.runtime_errors,
            clean: self.completed,
        }
    }

    /// Cycles executed so far.
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Currently configured cycle period.
    pub fn period(&self) -> u64 {
        self.period
    }

    /// The pin at `index`, if defined.
    pub fn pin(&self, index: usize) -> Option<&Pin> {
        self.pins.get(index).and_then(|slot| slot.as_ref())
    }

    /// The drive wave at `index`, if defined.
    pub fn drive_wave(&self, index: usize) -> Option<&Wave> {
        self.drive_waves.get(index)
    }

    /// The compare wave at `index`, if defined.
    pub fn compare_wave(&self, index: usize) -> Option<&Wave> {
        self.compare_waves.get(index)
    }

    /// Miscompare accounting for this session.
    pub fn tracker(&self) -> &ErrorTracker {
        &self.tracker
    }

    fn fail(
        &mut self,
        host: &mut dyn SimHost,
        err: BridgeError,
    ) -> Result<SessionSummary, BridgeError> {
        self.runtime_errors += 1;
        tracing::error!(error = %err, "session failed, shutting down");
        host.log(&format!("ERROR: {err}"));
        self.shutdown(host);
        if let Err(drain) = self.pump(host) {
            tracing::warn!(error = %drain, "error while draining the final cycle");
        }
        Err(err)
    }

    /// Drains host events until the current cycle burst is over.
    ///
    /// A `CycleEnd` either rolls straight into the next owed cycle or, when
    /// the burst is done, returns control to the message loop. Events
    /// scheduled past the period stay pending in the host; simulated time
    /// only moves while a burst is running.
    fn pump(&mut self, host: &mut dyn SimHost) -> Result<(), BridgeError> {
        while let Some(event) = host.advance() {
            match event {
                HostEvent::Action(ScheduledAction::CycleEnd) => {
                    if self.repeat > 0 {
                        self.repeat -= 1;
                        self.begin_cycle(host);
                    } else {
                        return Ok(());
                    }
                }
                HostEvent::Action(action) => self.apply_action(action, host)?,
                HostEvent::Miscompare(report) => self.report_miscompare(host, &report),
            }
        }
        Ok(())
    }

    fn begin_cycle(&mut self, host: &mut dyn SimHost) {
        self.cycle_count += 1;
        self.register_cycle_actions(host);
        host.schedule_after(self.period, ScheduledAction::CycleEnd);
    }

    /// Schedules this cycle's wave events for every wave with active pins.
    ///
    /// Actions are registered before the cycle-end marker so that an event
    /// landing exactly on the period boundary still applies within the
    /// cycle.
    fn register_cycle_actions(&self, host: &mut dyn SimHost) {
        for (index, wave) in self.drive_waves.iter().enumerate() {
            if wave.active().is_empty() {
                continue;
            }
            for event in wave.events() {
                host.schedule_after(
                    event.offset,
                    ScheduledAction::DriveApply { wave: index, symbol: event.symbol },
                );
            }
        }
        for (index, wave) in self.compare_waves.iter().enumerate() {
            if wave.active().is_empty() {
                continue;
            }
            for event in wave.events() {
                host.schedule_after(
                    event.offset,
                    ScheduledAction::CompareApply { wave: index, symbol: event.symbol },
                );
            }
        }
    }

    /// Applies one due wave event to the wave's active pins.
    ///
    /// The wave is re-resolved by index at apply time; a wave that no longer
    /// exists is a no-op. The symbol was bound at registration, so a symbol
    /// the table cannot express is a data fault in the wave definition.
    fn apply_action(
        &mut self,
        action: ScheduledAction,
        host: &mut dyn SimHost,
    ) -> Result<(), BridgeError> {
        match action {
            ScheduledAction::DriveApply { wave, symbol } => {
                let Some((force, enable)) = drive_levels(symbol) else {
                    return Err(BridgeError::UnexpectedSymbol {
                        table: WaveTable::Drive,
                        wave,
                        symbol,
                    });
                };
                let Some(entry) = self.drive_waves.get(wave) else {
                    return Ok(());
                };
                for &pin_index in entry.active().iter() {
                    let Some(pin) = self.pins.get(pin_index).and_then(|slot| slot.as_ref()) else {
                        continue;
                    };
                    if enable {
                        if let Some(signal) = pin.force_data {
                            host.put_int(signal, force, PutMode::Immediate);
                        }
                        if let Some(signal) = pin.drive {
                            host.put_int(signal, 1, PutMode::Immediate);
                        }
                    } else if let Some(signal) = pin.drive {
                        host.put_int(signal, 0, PutMode::Immediate);
                    }
                }
                Ok(())
            }
            ScheduledAction::CompareApply { wave, symbol } => {
                let Some(level) = compare_levels(symbol) else {
                    return Err(BridgeError::UnexpectedSymbol {
                        table: WaveTable::Compare,
                        wave,
                        symbol,
                    });
                };
                let Some(entry) = self.compare_waves.get(wave) else {
                    return Ok(());
                };
                for &pin_index in entry.active().iter() {
                    let Some(pin) = self.pins.get(pin_index).and_then(|slot| slot.as_ref()) else {
                        continue;
                    };
                    let target = if pin.capture_en { pin.capture } else { pin.compare };
                    if let Some(signal) = target {
                        host.put_int(signal, level, PutMode::Immediate);
                    }
                }
                Ok(())
            }
            ScheduledAction::CycleEnd => Ok(()),
        }
    }

    fn execute(
        &mut self,
        command: &Command,
        host: &mut dyn SimHost,
        transport: &mut dyn Transport,
    ) -> Result<Flow, BridgeError> {
        if self.tracker.is_degraded() && !degraded_allowed(command) {
            // Budget spent: stop touching the device but keep time moving so
            // the generator's cycle accounting stays coherent.
            self.repeat = 0;
            self.begin_cycle(host);
            return Ok(Flow::Cycle);
        }
        match command {
            Command::DefinePin { name, index, drive_wave, compare_wave } => {
                self.define_pin(host, name, *index, *drive_wave, *compare_wave);
                Ok(Flow::Continue)
            }
            Command::SetPeriod { period } => {
                self.set_period(*period);
                Ok(Flow::Continue)
            }
            Command::DrivePin { index, bit } => {
                self.set_drive(host, *index, *bit)?;
                Ok(Flow::Continue)
            }
            Command::RunCycles { count } => {
                self.repeat = count.saturating_sub(1);
                self.begin_cycle(host);
                Ok(Flow::Cycle)
            }
            Command::ComparePin { index, bit } => {
                self.set_compare(host, *index, *bit)?;
                Ok(Flow::Continue)
            }
            Command::DontCarePin { index } => {
                self.set_dont_care(host, *index)?;
                Ok(Flow::Continue)
            }
            Command::DefineWave { index, compare, events } => {
                self.define_wave(*index, *compare, events);
                Ok(Flow::Continue)
            }
            Command::SyncUp => {
                transport.send_line(SYNC_ACK)?;
                Ok(Flow::Continue)
            }
            Command::Complete => Ok(Flow::Complete),
            Command::Peek { net } => {
                let reply = match host.lookup(net) {
                    Some(signal) => host.get(signal).to_bin_string(),
                    None => PEEK_FAIL.to_string(),
                };
                transport.send_line(&reply)?;
                Ok(Flow::Continue)
            }
            Command::SetPattern { name } => {
                self.control_text(host, "debug.pattern", name);
                Ok(Flow::Continue)
            }
            Command::Poke { net, value } => {
                if let Some(signal) = host.lookup(net) {
                    host.put_dec(signal, value, PutMode::Immediate);
                }
                Ok(Flow::Continue)
            }
            Command::SetComment { text } => {
                self.control_text(host, "debug.comments", text);
                Ok(Flow::Continue)
            }
            Command::LogMessages { enabled } => {
                self.log_messages = *enabled;
                Ok(Flow::Continue)
            }
            Command::StartCapture { index } => {
                self.set_capture(host, *index)?;
                Ok(Flow::Continue)
            }
            Command::SyncEnable => {
                self.control_put(host, "pins.sync", 1);
                Ok(Flow::Continue)
            }
            Command::SyncDisable => {
                self.control_put(host, "pins.sync", 0);
                Ok(Flow::Continue)
            }
            Command::StopCapture { index } => {
                self.clear_capture(*index)?;
                Ok(Flow::Continue)
            }
            Command::Version => {
                transport.send_line(&self.version)?;
                Ok(Flow::Continue)
            }
            Command::LogLine { text } => {
                host.log(text);
                Ok(Flow::Continue)
            }
            Command::Flush => {
                host.flush();
                Ok(Flow::Continue)
            }
            Command::Timescale => {
                transport.send_line(&host.timescale().to_string())?;
                Ok(Flow::Continue)
            }
            Command::SetMaxErrors { limit } => {
                self.tracker.set_max_errors(*limit);
                Ok(Flow::Continue)
            }
            Command::Transaction { open: true } => {
                self.tracker.start_transaction();
                Ok(Flow::Continue)
            }
            Command::Transaction { open: false } => {
                self.send_transaction_report(transport)?;
                Ok(Flow::Continue)
            }
            Command::GetCycleCount => {
                transport.send_line(&self.cycle_count.to_string())?;
                Ok(Flow::Continue)
            }
            Command::SetCycleCount { count } => {
                self.cycle_count = *count;
                Ok(Flow::Continue)
            }
            Command::MatchLoop { open: true } => {
                self.tracker.open_match_loop();
                self.control_put(host, "debug.match_errors", 0);
                Ok(Flow::Continue)
            }
            Command::MatchLoop { open: false } => {
                self.tracker.close_match_loop();
                Ok(Flow::Continue)
            }
            Command::ForceNet { net, value } => {
                if let Some(signal) = host.lookup(net) {
                    host.put_dec(signal, value, PutMode::Force);
                }
                Ok(Flow::Continue)
            }
            Command::ReleaseNet { net } => {
                if let Some(signal) = host.lookup(net) {
                    host.put_dec(signal, "0", PutMode::Release);
                }
                Ok(Flow::Continue)
            }
        }
    }

    fn define_pin(
        &mut self,
        host: &mut dyn SimHost,
        name: &str,
        index: usize,
        drive_wave: usize,
        compare_wave: usize,
    ) {
        let base = format!("{}.pins.{}", self.top, name);
        let data = host.lookup(&format!("{base}.data"));
        let present = data.is_some();
        if !present {
            tracing::warn!(pin = name, "pin not present in the testbench");
            host.log(&format!(
                "WARNING: pin {name} is not present in the testbench, operations on it will be ignored"
            ));
        }
        let pin = Pin {
            name: name.to_string(),
            index,
            present,
            data,
            drive: host.lookup(&format!("{base}.drive")),
            force_data: host.lookup(&format!("{base}.force_data")),
            compare: host.lookup(&format!("{base}.compare")),
            capture: host.lookup(&format!("{base}.capture")),
            drive_wave,
            compare_wave,
            mode: PinMode::Idle,
            capture_en: false,
            drive_pos: 0,
            compare_pos: 0,
        };
        Self::ensure_wave(&mut self.drive_waves, drive_wave);
        Self::ensure_wave(&mut self.compare_waves, compare_wave);
        if index >= self.pins.len() {
            self.pins.resize_with(index + 1, || None);
        }
        self.pins[index] = Some(pin);
    }

    /// Sets the period and resets all pin and wave state.
    ///
    /// Counters survive; a pattern re-timing mid-run keeps its error and
    /// cycle accounting.
    fn set_period(&mut self, period: u64) {
        self.period = period;
        self.pins.clear();
        self.drive_waves = vec![Wave::whole_cycle_drive()];
        self.compare_waves = vec![Wave::new()];
        tracing::debug!(period, "period set, pin and wave state cleared");
    }

    fn set_drive(
        &mut self,
        host: &mut dyn SimHost,
        index: usize,
        bit: u8,
    ) -> Result<(), BridgeError> {
        let Some(pin) = self.pins.get(index).and_then(|slot| slot.as_ref()) else {
            return Err(BridgeError::UnknownPin { index });
        };
        if !pin.present {
            return Ok(());
        }
        let (data, drive, compare) = (pin.data, pin.drive, pin.compare);
        let (mode, drive_wave, compare_wave) = (pin.mode, pin.drive_wave, pin.compare_wave);

        if let Some(signal) = data {
            host.put_int(signal, u64::from(bit), PutMode::Immediate);
        }
        // Make sure the pin is not comparing.
        if let Some(signal) = compare {
            host.put_int(signal, 0, PutMode::Immediate);
        }

        if mode != PinMode::Driving {
            if self.drive_wave_is_whole_cycle(drive_wave) {
                // Data asserted for the whole cycle: hold the enable directly
                // and skip per-cycle scheduling for this pin.
                if let Some(signal) = drive {
                    host.put_int(signal, 1, PutMode::Immediate);
                }
            } else {
                self.join_set(WaveTable::Drive, drive_wave, index);
            }
            if mode == PinMode::Comparing {
                self.leave_set(WaveTable::Compare, compare_wave, index)?;
            }
            if let Some(pin) = self.pins.get_mut(index).and_then(|slot| slot.as_mut()) {
                pin.mode = PinMode::Driving;
            }
        }
        Ok(())
    }

    fn set_compare(
        &mut self,
        host: &mut dyn SimHost,
        index: usize,
        bit: u8,
    ) -> Result<(), BridgeError> {
        let Some(pin) = self.pins.get(index).and_then(|slot| slot.as_ref()) else {
            return Err(BridgeError::UnknownPin { index });
        };
        if !pin.present {
            return Ok(());
        }
        let (data, drive) = (pin.data, pin.drive);
        let (mode, drive_wave, compare_wave) = (pin.mode, pin.drive_wave, pin.compare_wave);

        // The expected value rides in the data register.
        if let Some(signal) = data {
            host.put_int(signal, u64::from(bit), PutMode::Immediate);
        }
        if let Some(signal) = drive {
            host.put_int(signal, 0, PutMode::Immediate);
        }

        if mode != PinMode::Comparing {
            self.join_set(WaveTable::Compare, compare_wave, index);
            if mode == PinMode::Driving && !self.drive_wave_is_whole_cycle(drive_wave) {
                self.leave_set(WaveTable::Drive, drive_wave, index)?;
            }
            if let Some(pin) = self.pins.get_mut(index).and_then(|slot| slot.as_mut()) {
                pin.mode = PinMode::Comparing;
            }
        }
        Ok(())
    }

    fn set_dont_care(&mut self, host: &mut dyn SimHost, index: usize) -> Result<(), BridgeError> {
        let Some(pin) = self.pins.get(index).and_then(|slot| slot.as_ref()) else {
            return Err(BridgeError::UnknownPin { index });
        };
        if !pin.present {
            return Ok(());
        }
        let (drive, compare) = (pin.drive, pin.compare);
        let (mode, drive_wave, compare_wave) = (pin.mode, pin.drive_wave, pin.compare_wave);

        if let Some(signal) = compare {
            host.put_int(signal, 0, PutMode::Immediate);
        }
        if let Some(signal) = drive {
            host.put_int(signal, 0, PutMode::Immediate);
        }
        match mode {
            PinMode::Driving => {
                if !self.drive_wave_is_whole_cycle(drive_wave) {
                    self.leave_set(WaveTable::Drive, drive_wave, index)?;
                }
            }
            PinMode::Comparing => self.leave_set(WaveTable::Compare, compare_wave, index)?,
            PinMode::Idle => {}
        }
        if let Some(pin) = self.pins.get_mut(index).and_then(|slot| slot.as_mut()) {
            pin.mode = PinMode::Idle;
        }
        Ok(())
    }

    /// Puts a pin into capture mode.
    ///
    /// Capture rides the compare machinery: the pin is put into compare mode
    /// with an expected value of 0 and the strobes are redirected to the
    /// capture enable while the flag is set.
    fn set_capture(&mut self, host: &mut dyn SimHost, index: usize) -> Result<(), BridgeError> {
        match self.pins.get_mut(index).and_then(|slot| slot.as_mut()) {
            Some(pin) => pin.capture_en = true,
            None => return Err(BridgeError::UnknownPin { index }),
        }
        self.set_compare(host, index, 0)
    }

    fn clear_capture(&mut self, index: usize) -> Result<(), BridgeError> {
        match self.pins.get_mut(index).and_then(|slot| slot.as_mut()) {
            Some(pin) => {
                pin.capture_en = false;
                Ok(())
            }
            None => Err(BridgeError::UnknownPin { index }),
        }
    }

    /// Defines or overwrites a wave. The activation set starts empty.
    fn define_wave(&mut self, index: usize, compare: bool, events: &[WaveEvent]) {
        let waves = if compare { &mut self.compare_waves } else { &mut self.drive_waves };
        Self::ensure_wave(waves, index);
        waves[index] = Wave::with_events(events.to_vec());
        tracing::debug!(index, compare, events = events.len(), "wave defined");
    }

    fn join_set(&mut self, table: WaveTable, wave: usize, pin: usize) {
        let waves = match table {
            WaveTable::Drive => &mut self.drive_waves,
            WaveTable::Compare => &mut self.compare_waves,
        };
        Self::ensure_wave(waves, wave);
        let position = waves[wave].active_mut().add(pin);
        if let Some(entry) = self.pins.get_mut(pin).and_then(|slot| slot.as_mut()) {
            match table {
                WaveTable::Drive => entry.drive_pos = position,
                WaveTable::Compare => entry.compare_pos = position,
            }
        }
    }

    fn leave_set(&mut self, table: WaveTable, wave: usize, pin: usize) -> Result<(), BridgeError> {
        let position = match self.pins.get(pin).and_then(|slot| slot.as_ref()) {
            Some(entry) => match table {
                WaveTable::Drive => entry.drive_pos,
                WaveTable::Compare => entry.compare_pos,
            },
            None => return Err(BridgeError::UnknownPin { index: pin }),
        };
        let waves = match table {
            WaveTable::Drive => &mut self.drive_waves,
            WaveTable::Compare => &mut self.compare_waves,
        };
        let Some(entry) = waves.get_mut(wave) else {
            return Err(BridgeError::ActivationCorrupt {
                table,
                wave,
                pin,
                reason: ActiveSetError::Empty,
            });
        };
        match entry.active_mut().remove(position, pin) {
            Ok(Some(moved)) => {
                // The former tail pin now sits where the removed one was.
                if let Some(other) = self.pins.get_mut(moved).and_then(|slot| slot.as_mut()) {
                    match table {
                        WaveTable::Drive => other.drive_pos = position,
                        WaveTable::Compare => other.compare_pos = position,
                    }
                }
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(reason) => Err(BridgeError::ActivationCorrupt { table, wave, pin, reason }),
        }
    }

    fn ensure_wave(waves: &mut Vec<Wave>, index: usize) {
        if index >= waves.len() {
            waves.resize_with(index + 1, Wave::new);
        }
    }

    fn drive_wave_is_whole_cycle(&self, index: usize) -> bool {
        self.drive_waves
            .get(index)
            .is_some_and(Wave::is_whole_cycle_drive)
    }

    /// Tells the testbench the run is over and schedules the final cycle.
    ///
    /// The period reset clears every pin and wave, so the last cycle runs
    /// quiet regardless of what the pattern was doing when it ended.
    fn shutdown(&mut self, host: &mut dyn SimHost) {
        self.repeat = 0;
        self.control_put(host, "finish", 1);
        let period = if self.period == 0 { SHUTDOWN_PERIOD } else { self.period };
        self.set_period(period);
        self.begin_cycle(host);
    }

    fn send_transaction_report(
        &mut self,
        transport: &mut dyn Transport,
    ) -> Result<(), BridgeError> {
        let report = self.tracker.close_transaction();
        transport.send_line(&format!("{}^{}", report.total, MAX_TRANSACTION_RECORDS))?;
        for record in &report.records {
            transport.send_line(&format!(
                "{}^{}^{}^{}",
                record.pin, record.cycle, record.expected, record.received
            ))?;
        }
        Ok(())
    }

    fn control_put(&self, host: &mut dyn SimHost, suffix: &str, value: u64) {
        let path = format!("{}.{}", self.top, suffix);
        if let Some(signal) = host.lookup(&path) {
            host.put_int(signal, value, PutMode::Immediate);
        }
    }

    fn control_text(&self, host: &mut dyn SimHost, suffix: &str, text: &str) {
        let path = format!("{}.{}", self.top, suffix);
        if let Some(signal) = host.lookup(&path) {
            host.put_text(signal, text);
        }
    }
}

/// Commands still served after the error breaker has tripped.
///
/// Everything here is pure status traffic; anything else would touch the
/// device or burn simulation time on a run already known dead.
fn degraded_allowed(command: &Command) -> bool {
    matches!(
        command,
        Command::SyncUp
            | Command::Complete
            | Command::Peek { .. }
            | Command::Version
            | Command::LogLine { .. }
            | Command::Flush
            | Command::Timescale
            | Command::Transaction { .. }
            | Command::GetCycleCount
    )
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet, VecDeque};

    use crate::host::{NetValue, SignalRef, RECEIVED_UNKNOWN};
    use crate::transport::TransportError;

    use super::*;

    /// In-memory host: a flat signal map plus a sorted timer list.
    struct TestHost {
        now: u64,
        seq: u64,
        timers: Vec<(u64, u64, ScheduledAction)>,
        signals: BTreeMap<String, u64>,
        texts: BTreeMap<String, String>,
        forced: BTreeSet<String>,
        refs: Vec<String>,
        reports: VecDeque<Miscompare>,
        logged: Vec<String>,
        flushes: u32,
    }

    impl TestHost {
        fn new() -> Self {
            TestHost {
                now: 0,
                seq: 0,
                timers: Vec::new(),
                signals: BTreeMap::new(),
                texts: BTreeMap::new(),
                forced: BTreeSet::new(),
                refs: Vec::new(),
                reports: VecDeque::new(),
                logged: Vec::new(),
                flushes: 0,
            }
        }

        fn with_pin(mut self, name: &str) -> Self {
            for leaf in ["data", "drive", "force_data", "compare", "capture"] {
                self.signals.insert(format!("bench.pins.{name}.{leaf}"), 0);
            }
            self
        }

        fn with_signal(mut self, path: &str, value: u64) -> Self {
            self.signals.insert(path.to_string(), value);
            self
        }

        fn value(&self, path: &str) -> u64 {
            self.signals[path]
        }

        fn push_report(&mut self, pin: &str, expected: u8, received: i64) {
            self.reports.push_back(Miscompare { pin: pin.to_string(), expected, received });
        }

        fn name_of(&self, signal: SignalRef) -> String {
            self.refs[signal.as_raw() as usize].clone()
        }
    }

    impl SimHost for TestHost {
        fn lookup(&mut self, path: &str) -> Option<SignalRef> {
            if !self.signals.contains_key(path) {
                return None;
            }
            let index = match self.refs.iter().position(|r| r == path) {
                Some(index) => index,
                None => {
                    self.refs.push(path.to_string());
                    self.refs.len() - 1
                }
            };
            Some(SignalRef::from_raw(index as u32))
        }

        fn put_int(&mut self, signal: SignalRef, value: u64, mode: PutMode) {
            let name = self.name_of(signal);
            match mode {
                PutMode::Immediate => {
                    if !self.forced.contains(&name) {
                        self.signals.insert(name, value);
                    }
                }
                PutMode::Force => {
                    self.signals.insert(name.clone(), value);
                    self.forced.insert(name);
                }
                PutMode::Release => {
                    self.forced.remove(&name);
                }
            }
        }

        fn put_dec(&mut self, signal: SignalRef, digits: &str, mode: PutMode) {
            let value = digits.parse().unwrap_or(0);
            self.put_int(signal, value, mode);
        }

        fn put_text(&mut self, signal: SignalRef, text: &str) {
            let name = self.name_of(signal);
            self.texts.insert(name, text.to_string());
        }

        fn get(&mut self, signal: SignalRef) -> NetValue {
            let value = self.signals[&self.name_of(signal)];
            let width = (64 - value.leading_zeros()).max(1) as usize;
            NetValue::from_u64(value, width)
        }

        fn schedule_after(&mut self, delay: u64, action: ScheduledAction) {
            self.timers.push((self.now + delay, self.seq, action));
            self.seq += 1;
        }

        fn advance(&mut self) -> Option<HostEvent> {
            if let Some(report) = self.reports.pop_front() {
                return Some(HostEvent::Miscompare(report));
            }
            let index = self
                .timers
                .iter()
                .enumerate()
                .min_by_key(|(_, &(due, seq, _))| (due, seq))
                .map(|(index, _)| index)?;
            let (due, _, action) = self.timers.remove(index);
            self.now = due;
            Some(HostEvent::Action(action))
        }

        fn timescale(&self) -> i32 {
            -12
        }

        fn flush(&mut self) {
            self.flushes += 1;
        }

        fn log(&mut self, message: &str) {
            self.logged.push(message.to_string());
        }
    }

    struct TestTransport {
        incoming: VecDeque<String>,
        sent: Vec<String>,
    }

    impl TestTransport {
        fn script(lines: &[&str]) -> Self {
            TestTransport {
                incoming: lines.iter().map(|l| l.to_string()).collect(),
                sent: Vec::new(),
            }
        }
    }

    impl Transport for TestTransport {
        fn send_line(&mut self, line: &str) -> Result<(), TransportError> {
            self.sent.push(line.to_string());
            Ok(())
        }

        fn receive_line(&mut self) -> Result<String, TransportError> {
            self.incoming.pop_front().ok_or(TransportError::Closed)
        }
    }

    fn bench_host() -> TestHost {
        TestHost::new()
            .with_pin("tck")
            .with_pin("tdo")
            .with_signal("bench.finish", 0)
            .with_signal("bench.pins.sync", 0)
            .with_signal("bench.debug.errors", 0)
            .with_signal("bench.debug.match_errors", 0)
            .with_signal("bench.debug.pattern", 0)
            .with_signal("bench.debug.comments", 0)
    }

    fn session() -> Session {
        Session::new(SessionConfig::default())
    }

    /// Executes one message the way the run loop would, including the event
    /// pump after a cycle burst.
    fn exec(
        session: &mut Session,
        host: &mut TestHost,
        transport: &mut TestTransport,
        line: &str,
    ) -> Result<Flow, BridgeError> {
        let command = parse_command(line).unwrap();
        let flow = session.execute(&command, host, transport)?;
        if flow == Flow::Cycle {
            session.pump(host)?;
        }
        Ok(flow)
    }

    fn exec_all(
        session: &mut Session,
        host: &mut TestHost,
        transport: &mut TestTransport,
        lines: &[&str],
    ) {
        for line in lines {
            exec(session, host, transport, line).unwrap();
        }
    }

    #[test]
    fn define_pin_resolves_harness_signals() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(&mut s, &mut h, &mut t, &["1^100", "0^tck^0^0^0"]);

        let pin = s.pin(0).unwrap();
        assert!(pin.present);
        assert_eq!(pin.name, "tck");
        assert!(pin.data.is_some());
        assert!(pin.drive.is_some());
        assert!(pin.force_data.is_some());
        assert!(pin.compare.is_some());
        assert!(pin.capture.is_some());
        assert_eq!(pin.mode, PinMode::Idle);
    }

    #[test]
    fn missing_pin_is_warned_and_ignored() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(&mut s, &mut h, &mut t, &["1^100", "0^vdd^0^0^0", "2^0^1"]);

        let pin = s.pin(0).unwrap();
        assert!(!pin.present);
        assert_eq!(pin.mode, PinMode::Idle);
        assert!(h.logged.iter().any(|l| l.starts_with("WARNING: pin vdd")));
    }

    #[test]
    fn whole_cycle_drive_asserts_enable_directly() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(&mut s, &mut h, &mut t, &["1^100", "0^tck^0^0^0", "2^0^1"]);

        assert_eq!(h.value("bench.pins.tck.data"), 1);
        assert_eq!(h.value("bench.pins.tck.drive"), 1);
        assert_eq!(h.value("bench.pins.tck.compare"), 0);
        assert_eq!(s.pin(0).unwrap().mode, PinMode::Driving);
        // No per-cycle scheduling for whole-cycle drives.
        assert!(s.drive_wave(0).unwrap().active().is_empty());
    }

    #[test]
    fn timed_drive_wave_applies_during_the_cycle() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(
            &mut s,
            &mut h,
            &mut t,
            &["1^100", "6^1^0^10_1_90_X", "0^tck^0^1^0", "2^0^1"],
        );
        assert_eq!(s.drive_wave(1).unwrap().active().len(), 1);
        assert_eq!(h.value("bench.pins.tck.drive"), 0);

        exec(&mut s, &mut h, &mut t, "3^1").unwrap();

        assert_eq!(s.cycle_count(), 1);
        // 10: force high asserted the enable, 90: the off event dropped it.
        assert_eq!(h.value("bench.pins.tck.force_data"), 2);
        assert_eq!(h.value("bench.pins.tck.drive"), 0);
        assert_eq!(h.now, 100);
    }

    #[test]
    fn drive_twice_keeps_a_single_membership() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(
            &mut s,
            &mut h,
            &mut t,
            &["1^100", "6^1^0^10_D", "0^tck^0^1^0", "2^0^1", "2^0^0"],
        );

        assert_eq!(s.drive_wave(1).unwrap().active().len(), 1);
        assert_eq!(h.value("bench.pins.tck.data"), 0);
        assert_eq!(s.pin(0).unwrap().mode, PinMode::Driving);
    }

    #[test]
    fn dont_care_empties_the_activation_set() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(
            &mut s,
            &mut h,
            &mut t,
            &["1^100", "6^1^0^10_D", "0^tck^0^1^0", "2^0^1", "5^0"],
        );

        assert!(s.drive_wave(1).unwrap().active().is_empty());
        assert_eq!(s.pin(0).unwrap().mode, PinMode::Idle);
        assert_eq!(h.value("bench.pins.tck.drive"), 0);
        assert_eq!(h.value("bench.pins.tck.compare"), 0);
    }

    #[test]
    fn dont_care_on_an_idle_pin_changes_nothing() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(&mut s, &mut h, &mut t, &["1^100", "6^1^0^10_D", "0^tck^0^1^1", "5^0"]);

        assert_eq!(s.pin(0).unwrap().mode, PinMode::Idle);
        assert!(s.drive_wave(1).unwrap().active().is_empty());
        assert!(s.compare_wave(1).unwrap().active().is_empty());
    }

    #[test]
    fn compare_strobe_drives_the_compare_enable() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(
            &mut s,
            &mut h,
            &mut t,
            &["1^100", "6^2^1^40_C", "0^tdo^1^0^2", "4^1^0"],
        );
        assert_eq!(s.compare_wave(2).unwrap().active().len(), 1);
        assert_eq!(h.value("bench.pins.tdo.data"), 0);
        assert_eq!(h.value("bench.pins.tdo.drive"), 0);
        assert_eq!(h.value("bench.pins.tdo.compare"), 0);

        exec(&mut s, &mut h, &mut t, "3^1").unwrap();

        // The strobe at 40 left the compare enable asserted.
        assert_eq!(h.value("bench.pins.tdo.compare"), 1);
        assert_eq!(s.cycle_count(), 1);
        assert_eq!(h.now, 100);
    }

    #[test]
    fn drive_after_compare_swaps_set_membership() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(
            &mut s,
            &mut h,
            &mut t,
            &["1^100", "6^1^0^10_D", "6^2^1^40_C", "0^tdo^0^1^2", "4^0^0", "2^0^1"],
        );

        assert!(s.compare_wave(2).unwrap().active().is_empty());
        assert_eq!(s.drive_wave(1).unwrap().active().len(), 1);
        assert_eq!(s.pin(0).unwrap().mode, PinMode::Driving);
    }

    #[test]
    fn swap_remove_fixes_the_moved_pins_position() {
        let mut s = session();
        let mut h = bench_host().with_pin("tms");
        let mut t = TestTransport::script(&[]);

        exec_all(
            &mut s,
            &mut h,
            &mut t,
            &[
                "1^100",
                "6^1^0^10_D",
                "0^tck^0^1^0",
                "0^tdo^1^1^0",
                "0^tms^2^1^0",
                "2^0^1",
                "2^1^1",
                "2^2^1",
                // Remove the first member; the last one swaps into slot 0.
                "5^0",
            ],
        );

        assert_eq!(s.drive_wave(1).unwrap().active().len(), 2);
        assert_eq!(s.pin(2).unwrap().drive_pos, 0);
        // The fixed-up position must still remove cleanly.
        exec(&mut s, &mut h, &mut t, "5^2").unwrap();
        assert_eq!(s.drive_wave(1).unwrap().active().len(), 1);
        assert!(s.drive_wave(1).unwrap().active().contains(1));
    }

    #[test]
    fn capture_redirects_strobes_to_the_capture_enable() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(
            &mut s,
            &mut h,
            &mut t,
            &["1^100", "6^2^1^40_C", "0^tdo^1^0^2", "e^1"],
        );
        assert!(s.pin(1).unwrap().capture_en);
        assert_eq!(s.pin(1).unwrap().mode, PinMode::Comparing);

        exec(&mut s, &mut h, &mut t, "3^1").unwrap();
        // The strobe went to capture, not compare.
        assert_eq!(h.value("bench.pins.tdo.capture"), 1);
        assert_eq!(h.value("bench.pins.tdo.compare"), 0);

        exec(&mut s, &mut h, &mut t, "h^1").unwrap();
        assert!(!s.pin(1).unwrap().capture_en);
        assert_eq!(s.pin(1).unwrap().mode, PinMode::Comparing);
    }

    #[test]
    fn run_cycles_repeats_and_counts() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(&mut s, &mut h, &mut t, &["1^100", "3^3"]);
        assert_eq!(s.cycle_count(), 3);
        assert_eq!(h.now, 300);

        // A zero count still runs one cycle.
        exec(&mut s, &mut h, &mut t, "3^0").unwrap();
        assert_eq!(s.cycle_count(), 4);
    }

    #[test]
    fn period_reset_clears_state_but_not_counters() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(&mut s, &mut h, &mut t, &["1^100", "0^tck^0^0^0", "3^2"]);
        s.report_miscompare(
            &mut h,
            &Miscompare { pin: "tck".into(), expected: 1, received: 0 },
        );

        exec(&mut s, &mut h, &mut t, "1^200").unwrap();

        assert!(s.pin(0).is_none());
        assert_eq!(s.period(), 200);
        assert_eq!(s.cycle_count(), 2);
        assert_eq!(s.tracker().error_count(), 1);
    }

    #[test]
    fn peek_replies_value_or_fail() {
        let mut s = session();
        let mut h = bench_host().with_signal("bench.dut.port", 5);
        let mut t = TestTransport::script(&[]);

        exec(&mut s, &mut h, &mut t, "9^bench.dut.port").unwrap();
        exec(&mut s, &mut h, &mut t, "9^bench.dut.absent").unwrap();

        assert_eq!(t.sent, vec!["101", "FAIL"]);
    }

    #[test]
    fn poke_writes_a_decimal_value() {
        let mut s = session();
        let mut h = bench_host().with_signal("bench.dut.port", 0);
        let mut t = TestTransport::script(&[]);

        exec(&mut s, &mut h, &mut t, "b^bench.dut.port^9").unwrap();
        assert_eq!(h.value("bench.dut.port"), 9);

        // Poking a missing net is a silent no-op.
        exec(&mut s, &mut h, &mut t, "b^bench.dut.absent^1").unwrap();
    }

    #[test]
    fn force_holds_through_pokes_until_release() {
        let mut s = session();
        let mut h = bench_host().with_signal("bench.dut.por", 0);
        let mut t = TestTransport::script(&[]);

        exec(&mut s, &mut h, &mut t, "r^bench.dut.por^1").unwrap();
        assert_eq!(h.value("bench.dut.por"), 1);

        exec(&mut s, &mut h, &mut t, "b^bench.dut.por^0").unwrap();
        assert_eq!(h.value("bench.dut.por"), 1);

        exec(&mut s, &mut h, &mut t, "s^bench.dut.por").unwrap();
        exec(&mut s, &mut h, &mut t, "b^bench.dut.por^0").unwrap();
        assert_eq!(h.value("bench.dut.por"), 0);
    }

    #[test]
    fn status_replies() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec(&mut s, &mut h, &mut t, "7^").unwrap();
        exec(&mut s, &mut h, &mut t, "i^").unwrap();
        exec(&mut s, &mut h, &mut t, "l^").unwrap();
        exec(&mut s, &mut h, &mut t, "o^").unwrap();
        exec(&mut s, &mut h, &mut t, "p^55").unwrap();
        exec(&mut s, &mut h, &mut t, "o^").unwrap();

        assert_eq!(
            t.sent,
            vec!["OK!", env!("CARGO_PKG_VERSION"), "-12", "0", "55"]
        );
    }

    #[test]
    fn sync_pulse_toggles_the_sync_signal() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec(&mut s, &mut h, &mut t, "f^").unwrap();
        assert_eq!(h.value("bench.pins.sync"), 1);
        exec(&mut s, &mut h, &mut t, "g^").unwrap();
        assert_eq!(h.value("bench.pins.sync"), 0);
    }

    #[test]
    fn pattern_and_comment_land_in_debug_registers() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec(&mut s, &mut h, &mut t, "a^boot_rom").unwrap();
        exec(&mut s, &mut h, &mut t, "c^phase two: regulator settle").unwrap();

        assert_eq!(h.texts["bench.debug.pattern"], "boot_rom");
        assert_eq!(h.texts["bench.debug.comments"], "phase two: regulator settle");
    }

    #[test]
    fn log_and_flush_reach_the_host() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec(&mut s, &mut h, &mut t, "j^pattern started").unwrap();
        exec(&mut s, &mut h, &mut t, "k^").unwrap();

        assert_eq!(h.logged, vec!["pattern started"]);
        assert_eq!(h.flushes, 1);
    }

    #[test]
    fn miscompares_update_the_debug_counters() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        s.report_miscompare(
            &mut h,
            &Miscompare { pin: "tdo".into(), expected: 1, received: 0 },
        );
        assert_eq!(h.value("bench.debug.errors"), 1);
        assert_eq!(h.value("bench.debug.match_errors"), 0);

        exec(&mut s, &mut h, &mut t, "q^1").unwrap();
        s.report_miscompare(
            &mut h,
            &Miscompare { pin: "tdo".into(), expected: 0, received: RECEIVED_UNKNOWN },
        );
        assert_eq!(h.value("bench.debug.errors"), 2);
        assert_eq!(h.value("bench.debug.match_errors"), 1);

        exec(&mut s, &mut h, &mut t, "q^0").unwrap();
        assert_eq!(s.tracker().match_errors(), 1);
    }

    #[test]
    fn miscompare_events_from_the_host_are_pumped() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(&mut s, &mut h, &mut t, &["1^100", "0^tdo^1^0^0"]);
        h.push_report("tdo", 1, 0);
        exec(&mut s, &mut h, &mut t, "3^1").unwrap();

        assert_eq!(s.tracker().error_count(), 1);
        assert_eq!(h.value("bench.debug.errors"), 1);
    }

    #[test]
    fn breaker_turns_state_changes_into_bare_cycles() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(&mut s, &mut h, &mut t, &["1^100", "0^tck^0^0^0", "2^0^1", "m^2"]);
        for _ in 0..3 {
            s.report_miscompare(
                &mut h,
                &Miscompare { pin: "tck".into(), expected: 0, received: 1 },
            );
        }
        assert!(s.tracker().is_degraded());

        let cycles_before = s.cycle_count();
        let flow = exec(&mut s, &mut h, &mut t, "2^0^0").unwrap();
        assert_eq!(flow, Flow::Cycle);
        assert_eq!(s.cycle_count(), cycles_before + 1);
        // The drive message was not applied.
        assert_eq!(h.value("bench.pins.tck.data"), 1);

        // Status traffic still flows.
        exec(&mut s, &mut h, &mut t, "7^").unwrap();
        exec(&mut s, &mut h, &mut t, "o^").unwrap();
        assert_eq!(t.sent, vec!["OK!", (cycles_before + 1).to_string().as_str()]);
    }

    #[test]
    fn degraded_run_skips_definitions_but_still_completes() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[
            "1^100",
            "0^tck^0^0^0",
            "m^0",
            "3^1",
            "0^tdo^1^0^0",
            "8^",
        ]);
        h.push_report("tck", 1, 0);

        let summary = s.run(&mut h, &mut t).unwrap();

        // The report pumped during the burst blew the zero budget.
        assert!(summary.max_errors_exceeded);
        assert!(summary.clean);
        // The later define became a bare cycle instead of a pin.
        assert!(s.pin(1).is_none());
        assert_eq!(summary.cycles, 3);
        assert_eq!(h.value("bench.finish"), 1);
    }

    #[test]
    fn breaker_defers_until_the_transaction_closes() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(&mut s, &mut h, &mut t, &["1^100", "0^tck^0^0^0", "m^1", "n^1"]);
        for _ in 0..3 {
            s.report_miscompare(
                &mut h,
                &Miscompare { pin: "tck".into(), expected: 1, received: 0 },
            );
        }
        assert!(!s.tracker().is_degraded());

        // Ordinary work still executes while the transaction holds the breaker.
        exec(&mut s, &mut h, &mut t, "2^0^1").unwrap();
        assert_eq!(h.value("bench.pins.tck.data"), 1);

        exec(&mut s, &mut h, &mut t, "n^0").unwrap();
        assert!(s.tracker().is_degraded());
        assert_eq!(t.sent[0], "3^128");
        assert_eq!(t.sent.len(), 4);
    }

    #[test]
    fn transaction_report_lines_carry_pin_cycle_and_levels() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(&mut s, &mut h, &mut t, &["1^50", "n^1", "3^2"]);
        s.report_miscompare(
            &mut h,
            &Miscompare { pin: "tdo".into(), expected: 1, received: 0 },
        );
        s.report_miscompare(
            &mut h,
            &Miscompare { pin: "tms".into(), expected: 0, received: RECEIVED_UNKNOWN },
        );
        exec(&mut s, &mut h, &mut t, "n^0").unwrap();

        assert_eq!(t.sent, vec!["2^128", "tdo^2^1^0", "tms^2^0^-1"]);
    }

    #[test]
    fn unknown_pin_index_is_fatal() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec(&mut s, &mut h, &mut t, "1^100").unwrap();
        let err = exec(&mut s, &mut h, &mut t, "2^9^1").unwrap_err();
        assert!(matches!(err, BridgeError::UnknownPin { index: 9 }));
    }

    #[test]
    fn redefining_a_wave_orphans_its_members() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(
            &mut s,
            &mut h,
            &mut t,
            &["1^100", "6^1^0^10_D", "0^tck^0^1^0", "2^0^1", "6^1^0^20_D"],
        );
        assert!(s.drive_wave(1).unwrap().active().is_empty());

        let err = exec(&mut s, &mut h, &mut t, "5^0").unwrap_err();
        assert!(matches!(
            err,
            BridgeError::ActivationCorrupt { table: WaveTable::Drive, wave: 1, pin: 0, .. }
        ));
    }

    #[test]
    fn compare_symbol_in_a_drive_wave_is_fatal() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&[]);

        exec_all(&mut s, &mut h, &mut t, &["1^100", "6^1^0^10_C", "0^tck^0^1^0", "2^0^1"]);
        let err = exec(&mut s, &mut h, &mut t, "3^1").unwrap_err();
        assert!(matches!(
            err,
            BridgeError::UnexpectedSymbol { table: WaveTable::Drive, wave: 1, .. }
        ));
    }

    #[test]
    fn run_serves_a_whole_pattern() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&["1^100", "0^tdo^0^0^0", "2^0^1", "3^1", "8^"]);

        let summary = s.run(&mut h, &mut t).unwrap();

        assert_eq!(t.sent, vec!["READY!"]);
        // One pattern cycle plus the shutdown cycle.
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.errors, 0);
        assert_eq!(summary.runtime_errors, 0);
        assert!(summary.clean);
        assert!(!summary.max_errors_exceeded);
        assert_eq!(h.value("bench.finish"), 1);
    }

    #[test]
    fn run_echoes_messages_once_enabled() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&["d^1", "7^", "8^"]);

        s.run(&mut h, &mut t).unwrap();

        assert!(h.logged.contains(&"[MESSAGE] 7^".to_string()));
        assert!(!h.logged.iter().any(|l| l == "[MESSAGE] d^1"));
    }

    #[test]
    fn lost_transport_shuts_the_run_down() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&["1^100"]);

        let err = s.run(&mut h, &mut t).unwrap_err();

        assert!(matches!(err, BridgeError::Transport(TransportError::Closed)));
        assert_eq!(h.value("bench.finish"), 1);
        let summary = s.summary();
        assert_eq!(summary.runtime_errors, 1);
        assert!(!summary.clean);
        // The shutdown cycle still ran.
        assert_eq!(summary.cycles, 1);
    }

    #[test]
    fn illegal_message_fails_the_run() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&["zz^1"]);

        let err = s.run(&mut h, &mut t).unwrap_err();

        assert!(matches!(err, BridgeError::Protocol(_)));
        assert!(h
            .logged
            .iter()
            .any(|l| l.starts_with("ERROR: illegal message received: zz^1")));
        assert_eq!(h.value("bench.finish"), 1);
    }

    #[test]
    fn shutdown_without_a_period_still_cycles() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&["8^"]);

        let summary = s.run(&mut h, &mut t).unwrap();

        assert_eq!(summary.cycles, 1);
        assert_eq!(h.now, 1000);
    }

    #[test]
    fn summary_serializes_for_reporting() {
        let mut s = session();
        let mut h = bench_host();
        let mut t = TestTransport::script(&["8^"]);
        s.run(&mut h, &mut t).unwrap();

        let json = serde_json::to_value(s.summary()).unwrap();
        assert_eq!(json["cycles"], 1);
        assert_eq!(json["clean"], true);
        assert_eq!(json["errors"], 0);
    }
}
