// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application-side logging state.
//!
//! One [`UserState`] per process holds everything the library needs to turn
//! API calls into wire frames:
//!
//! ```text
//!   +-----------------------------------------------------------+
//!   |  UserState                                                |
//!   |   +---------------------+   +---------------------------+ |
//!   |   | context arena       |   | startup ring buffer       | |
//!   |   | slot 0: APP1/CTX1   |   | (DltBuffer, dynamic)      | |
//!   |   | slot 1: APP1/CTX2   |   +---------------------------+ |
//!   |   | ...                 |   | daemon link (optional)    | |
//!   |   +---------------------+   +---------------------------+ |
//!   +-----------------------------------------------------------+
//! ```
//!
//! While no daemon link is attached, finished frames land in the ring
//! buffer; attaching a link drains it in FIFO order before new frames go out
//! directly. Contexts live in an arena and are addressed by [`Context`]
//! handles carrying a slot index plus a generation; a handle for an
//! unregistered slot is rejected instead of reaching stale state.
//!
//! All mutable state sits behind one `parking_lot::Mutex`, shared with the
//! segmented-send worker. Injection and level-change callbacks are invoked
//! with the lock released, so they may log.

pub mod daemon;
mod segmented;

use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::buffer::DltBuffer;
use crate::config::{LocalPrintMode, UserConfig, RESEND_BUF_MAX_SIZE};
use crate::error::{DltError, Result};
use crate::protocol::argument::{self, Attributes};
use crate::protocol::constants::*;
use crate::protocol::header::{ExtendedHeader, HeaderExtra, StandardHeader};
use crate::protocol::message::Message;
use crate::protocol::{host_is_msbf, put_u16, put_u32, DltId, LogLevel, TraceStatus};
use crate::receiver::{GetFlags, Receiver};
use crate::transport::DaemonLink;

use daemon::{InjectionBody, LogLevelChangedBody, UserMessageHeader};
use segmented::SegmentedSender;

/// Context id used for locally generated overflow markers.
const OVERFLOW_CTID: &str = "OVFL";

/// Chunk payload size for segmented network traces.
const SEGMENT_CHUNK_SIZE: usize = 1024;

/// Handle to a registered context. Copyable; stays cheap to pass around.
///
/// The generation ties the handle to one registration: after
/// [`UserState::unregister_context`] the slot may be reused, and the old
/// handle is rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Context {
    index: usize,
    generation: u32,
    id: DltId,
}

impl Context {
    pub fn id(&self) -> DltId {
        self.id
    }
}

struct Injection {
    service_id: u32,
    callback: Box<dyn FnMut(u32, &[u8]) + Send>,
}

type LevelCallback = Box<dyn FnMut(DltId, LogLevel, TraceStatus) + Send>;

struct Slot {
    occupied: bool,
    generation: u32,
    id: DltId,
    log_level: LogLevel,
    trace_status: TraceStatus,
    description: String,
    mcnt: u8,
    injections: Vec<Injection>,
    on_level_changed: Option<LevelCallback>,
}

pub(crate) struct Inner {
    config: UserConfig,
    ecu: DltId,
    app: DltId,
    app_description: String,
    contexts: Vec<Slot>,
    buffer: DltBuffer,
    link: Option<Box<dyn DaemonLink>>,
    /// Frames dropped since the last successful drain.
    overflow_counter: u32,
    /// Message counter for locally generated frames without a context slot.
    marker_mcnt: u8,
    session_id: u32,
    start: Instant,
    log_state_connected: bool,
}

/// Per-process logging state; the entry point of the library.
pub struct UserState {
    inner: Arc<Mutex<Inner>>,
    segmented: SegmentedSender,
}

impl UserState {
    /// Register the application and build its state. The startup ring buffer
    /// is sized from `config`; no daemon link is attached yet.
    pub fn new(app_id: &str, description: &str, config: UserConfig) -> Result<Self> {
        let buffer =
            DltBuffer::new_dynamic(config.buffer_min, config.buffer_max, config.buffer_step)?;
        let inner = Arc::new(Mutex::new(Inner {
            config,
            ecu: DltId::new("ECU1"),
            app: DltId::new(app_id),
            app_description: description.to_owned(),
            contexts: Vec::new(),
            buffer,
            link: None,
            overflow_counter: 0,
            marker_mcnt: 0,
            session_id: std::process::id(),
            start: Instant::now(),
            log_state_connected: false,
        }));
        let segmented = SegmentedSender::spawn(Arc::clone(&inner));
        log::debug!("[USR] application {app_id:?} registered");
        Ok(Self { inner, segmented })
    }

    pub fn app_id(&self) -> DltId {
        self.inner.lock().app
    }

    pub fn app_description(&self) -> String {
        self.inner.lock().app_description.clone()
    }

    pub fn ecu_id(&self) -> DltId {
        self.inner.lock().ecu
    }

    pub fn set_ecu_id(&self, ecu: &str) {
        self.inner.lock().ecu = DltId::new(ecu);
    }

    /// Register a context with default level and trace status. The initial
    /// level comes from the configured per-context overrides, if any.
    pub fn register_context(&self, ctx_id: &str, description: &str) -> Result<Context> {
        self.register_context_ll_ts(ctx_id, description, LogLevel::Default, TraceStatus::Default)
    }

    /// Register a context with an explicit level and trace status.
    pub fn register_context_ll_ts(
        &self,
        ctx_id: &str,
        description: &str,
        log_level: LogLevel,
        trace_status: TraceStatus,
    ) -> Result<Context> {
        let id = DltId::new(ctx_id);
        if id.is_empty() {
            return Err(DltError::WrongParameter("empty context id"));
        }
        let mut inner = self.inner.lock();
        if inner
            .contexts
            .iter()
            .any(|slot| slot.occupied && slot.id == id)
        {
            return Err(DltError::WrongParameter("context already registered"));
        }
        let app = inner.app;
        let level = match log_level {
            LogLevel::Default => inner
                .config
                .initial_level_for(app, id)
                .unwrap_or(LogLevel::Default),
            explicit => explicit,
        };
        let slot = Slot {
            occupied: true,
            generation: 0,
            id,
            log_level: level,
            trace_status,
            description: description.to_owned(),
            mcnt: 0,
            injections: Vec::new(),
            on_level_changed: None,
        };
        let index = match inner.contexts.iter().position(|s| !s.occupied) {
            Some(index) => {
                let generation = inner.contexts[index].generation + 1;
                inner.contexts[index] = Slot { generation, ..slot };
                index
            }
            None => {
                inner.contexts.push(slot);
                inner.contexts.len() - 1
            }
        };
        let generation = inner.contexts[index].generation;
        log::debug!("[USR] context {id} registered at slot {index}");
        Ok(Context {
            index,
            generation,
            id,
        })
    }

    pub fn unregister_context(&self, ctx: &Context) -> Result<()> {
        let mut inner = self.inner.lock();
        let slot = resolve_mut(&mut inner, ctx)?;
        slot.occupied = false;
        slot.injections.clear();
        slot.on_level_changed = None;
        log::debug!("[USR] context {} unregistered", ctx.id);
        Ok(())
    }

    /// Current effective log level of a context.
    pub fn context_log_level(&self, ctx: &Context) -> Result<LogLevel> {
        let mut inner = self.inner.lock();
        Ok(resolve_mut(&mut inner, ctx)?.log_level)
    }

    /// Description the context was registered with.
    pub fn context_description(&self, ctx: &Context) -> Result<String> {
        let mut inner = self.inner.lock();
        Ok(resolve_mut(&mut inner, ctx)?.description.clone())
    }

    /// Cheap filter check; `false` means a message at `level` would be
    /// dropped before any encoding work.
    pub fn is_level_enabled(&self, ctx: &Context, level: LogLevel) -> bool {
        let mut inner = self.inner.lock();
        match resolve_mut(&mut inner, ctx) {
            Ok(slot) => level_passes(slot.log_level, level),
            Err(_) => false,
        }
    }

    /// Start a verbose log message. `Ok(None)` means the level filter
    /// rejected it; skip the appends and the finish.
    pub fn log_start(&self, ctx: &Context, level: LogLevel) -> Result<Option<MessageBuilder>> {
        if matches!(level, LogLevel::Default | LogLevel::Off) {
            return Err(DltError::WrongParameter("unusable message level"));
        }
        let mut inner = self.inner.lock();
        let slot = resolve_mut(&mut inner, ctx)?;
        if !level_passes(slot.log_level, level) {
            return Ok(None);
        }
        let verbose = inner.config.verbose;
        let budget = inner.config.log_buf_len;
        Ok(Some(MessageBuilder::new(*ctx, level, verbose, budget, None)))
    }

    /// Start a non-verbose log message carrying `message_id`. Arguments are
    /// appended without type information.
    pub fn log_start_id(
        &self,
        ctx: &Context,
        level: LogLevel,
        message_id: u32,
    ) -> Result<Option<MessageBuilder>> {
        if matches!(level, LogLevel::Default | LogLevel::Off) {
            return Err(DltError::WrongParameter("unusable message level"));
        }
        let mut inner = self.inner.lock();
        let slot = resolve_mut(&mut inner, ctx)?;
        if !level_passes(slot.log_level, level) {
            return Ok(None);
        }
        let budget = inner.config.log_buf_len;
        Ok(Some(MessageBuilder::new(
            *ctx,
            level,
            false,
            budget,
            Some(message_id),
        )))
    }

    /// Encode the built message and route it to the daemon or the startup
    /// buffer.
    pub fn log_finish(&self, msg: MessageBuilder) -> Result<()> {
        let mut inner = self.inner.lock();
        let mtin = msg.level.as_raw() as u8;
        let frame = build_frame(
            &mut inner,
            Some(&msg.context),
            TYPE_LOG,
            mtin,
            msg.verbose,
            msg.noar,
            msg.payload,
            msg.timestamp,
        )?;
        route_locked(&mut inner, &frame)
    }

    /// Log one string, split across as many messages as its length needs.
    /// Splits happen on character boundaries.
    pub fn log_string(&self, ctx: &Context, level: LogLevel, text: &str) -> Result<()> {
        let empty = Attributes::default();
        let budget = self.inner.lock().config.log_buf_len;
        let overhead = argument::str_arg_size("", &empty);
        let max_chunk = budget.saturating_sub(overhead).max(1);
        let mut rest = text;
        loop {
            let mut cut = floor_char_boundary(rest, max_chunk.min(rest.len()));
            if cut == 0 && !rest.is_empty() {
                // never cut inside a char; a budget too small for one char
                // surfaces as UserBufferFull from the append below
                cut = rest.chars().next().map_or(rest.len(), char::len_utf8);
            }
            let (chunk, tail) = rest.split_at(cut);
            let mut builder = match self.log_start(ctx, level)? {
                Some(b) => b,
                None => return Ok(()),
            };
            builder.append_str(chunk)?;
            self.log_finish(builder)?;
            if tail.is_empty() {
                return Ok(());
            }
            rest = tail;
        }
    }

    /// Send a network trace as a single message: one raw argument for the
    /// protocol header, one for the payload. Gated by the context's trace
    /// status, not its log level.
    pub fn trace_network(
        &self,
        ctx: &Context,
        net_type: u8,
        header: &[u8],
        payload: &[u8],
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let slot = resolve_mut(&mut inner, ctx)?;
        if slot.trace_status != TraceStatus::On {
            return Ok(());
        }
        let msbf = host_is_msbf();
        let empty = Attributes::default();
        let mut body = Vec::new();
        argument::write_raw(&mut body, header, msbf, &empty);
        argument::write_raw(&mut body, payload, msbf, &empty);
        if body.len() > inner.config.log_buf_len {
            return Err(DltError::UserBufferFull);
        }
        let frame = build_frame(
            &mut inner,
            Some(ctx),
            TYPE_NW_TRACE,
            net_type,
            true,
            2,
            body,
            None,
        )?;
        route_locked(&mut inner, &frame)
    }

    /// Send a large network trace segmented: a start frame announcing the
    /// transfer, chunk frames of [`SEGMENT_CHUNK_SIZE`] payload bytes each
    /// and an end frame. The frames are built here and handed to the
    /// background worker; a full worker queue drops the whole trace.
    pub fn trace_network_segmented(
        &self,
        ctx: &Context,
        net_type: u8,
        header: &[u8],
        payload: &[u8],
    ) -> Result<()> {
        // The start frame announces the chunk count as a u16.
        if payload.len() > SEGMENT_CHUNK_SIZE * usize::from(u16::MAX) {
            return Err(DltError::WrongParameter("segmented payload too large"));
        }
        let frames = {
            let mut inner = self.inner.lock();
            let slot = resolve_mut(&mut inner, ctx)?;
            if slot.trace_status != TraceStatus::On {
                return Ok(());
            }
            let msbf = host_is_msbf();
            let empty = Attributes::default();
            let chunks: Vec<&[u8]> = payload.chunks(SEGMENT_CHUNK_SIZE).collect();
            let mut frames = Vec::with_capacity(chunks.len() + 2);

            let mut body = Vec::new();
            argument::write_str(&mut body, "NWST", msbf, &empty);
            argument::write_raw(&mut body, header, msbf, &empty);
            let mut len_arg = Vec::new();
            put_u32(&mut len_arg, payload.len() as u32, msbf);
            argument::write_raw(&mut body, &len_arg, msbf, &empty);
            let mut count_arg = Vec::new();
            put_u16(&mut count_arg, chunks.len() as u16, msbf);
            argument::write_raw(&mut body, &count_arg, msbf, &empty);
            frames.push(build_frame(
                &mut inner,
                Some(ctx),
                TYPE_NW_TRACE,
                net_type,
                true,
                4,
                body,
                None,
            )?);

            for (seq, chunk) in chunks.iter().enumerate() {
                let mut body = Vec::new();
                argument::write_str(&mut body, "NWCH", msbf, &empty);
                let mut seq_arg = Vec::new();
                put_u16(&mut seq_arg, seq as u16, msbf);
                argument::write_raw(&mut body, &seq_arg, msbf, &empty);
                argument::write_raw(&mut body, chunk, msbf, &empty);
                frames.push(build_frame(
                    &mut inner,
                    Some(ctx),
                    TYPE_NW_TRACE,
                    net_type,
                    true,
                    3,
                    body,
                    None,
                )?);
            }

            let mut body = Vec::new();
            argument::write_str(&mut body, "NWEN", msbf, &empty);
            frames.push(build_frame(
                &mut inner,
                Some(ctx),
                TYPE_NW_TRACE,
                net_type,
                true,
                1,
                body,
                None,
            )?);
            frames
        };
        match self.segmented.enqueue(frames) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.inner.lock().overflow_counter += 1;
                Err(e)
            }
        }
    }

    /// Attach a daemon link and drain the startup buffer through it.
    /// Returns the number of buffered frames that went out.
    pub fn connect(&self, link: Box<dyn DaemonLink>) -> Result<usize> {
        let mut inner = self.inner.lock();
        log::debug!("[USR] daemon link attached: {}", link.describe());
        inner.link = Some(link);
        drain_locked(&mut inner)
    }

    /// Detach the daemon link; subsequent frames buffer again.
    pub fn disconnect(&self) {
        let mut inner = self.inner.lock();
        if inner.link.take().is_some() {
            log::debug!("[USR] daemon link detached");
        }
        inner.log_state_connected = false;
    }

    /// Drain buffered frames through the attached link. Stops early on
    /// backpressure, keeping the remainder buffered.
    pub fn resend_buffered(&self) -> Result<usize> {
        drain_locked(&mut self.inner.lock())
    }

    pub fn buffered_messages(&self) -> usize {
        self.inner.lock().buffer.message_count()
    }

    pub fn overflow_count(&self) -> u32 {
        self.inner.lock().overflow_counter
    }

    /// Whether the daemon reported an attached client (log state).
    pub fn daemon_logging_enabled(&self) -> bool {
        self.inner.lock().log_state_connected
    }

    /// Flush the startup buffer at process exit, retrying on backpressure
    /// until `timeout` elapses. Returns the number of frames still buffered.
    pub fn atexit_flush(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let mut inner = self.inner.lock();
            if inner.buffer.message_count() == 0 || inner.link.is_none() {
                return inner.buffer.message_count();
            }
            match drain_locked(&mut inner) {
                Ok(_) => return inner.buffer.message_count(),
                Err(DltError::PipeFull) => {
                    let remaining = inner.buffer.message_count();
                    drop(inner);
                    if Instant::now() >= deadline {
                        log::warn!("[USR] exit flush timed out, {remaining} frames lost");
                        return remaining;
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                Err(e) => {
                    log::warn!("[USR] exit flush aborted: {e}");
                    return inner.buffer.message_count();
                }
            }
        }
    }

    /// Register a callback for one injection service id. Ids below
    /// [`INJECTION_SERVICE_ID_MIN`] are reserved for daemon control services.
    pub fn register_injection_callback(
        &self,
        ctx: &Context,
        service_id: u32,
        callback: impl FnMut(u32, &[u8]) + Send + 'static,
    ) -> Result<()> {
        if service_id < INJECTION_SERVICE_ID_MIN {
            return Err(DltError::WrongParameter("injection service id reserved"));
        }
        let mut inner = self.inner.lock();
        let slot = resolve_mut(&mut inner, ctx)?;
        slot.injections.retain(|i| i.service_id != service_id);
        slot.injections.push(Injection {
            service_id,
            callback: Box::new(callback),
        });
        Ok(())
    }

    /// Register a callback fired when the daemon changes the context's log
    /// level or trace status.
    pub fn register_log_level_changed_callback(
        &self,
        ctx: &Context,
        callback: impl FnMut(DltId, LogLevel, TraceStatus) + Send + 'static,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let slot = resolve_mut(&mut inner, ctx)?;
        slot.on_level_changed = Some(Box::new(callback));
        Ok(())
    }

    /// Parse and apply the daemon control messages buffered in `receiver`.
    /// Returns how many messages were handled. Incomplete trailing messages
    /// stay buffered for the next receive.
    pub fn process_daemon_messages<R: Read>(&self, receiver: &mut Receiver<R>) -> Result<usize> {
        let mut handled = 0;
        loop {
            let mut header = [0u8; USER_HEADER_SIZE];
            let peek = GetFlags {
                skip_header: false,
                consume: false,
            };
            match receiver.check_and_get(&mut header, peek) {
                Ok(()) => {}
                Err(DltError::NotEnoughData) => break,
                Err(e) => return Err(e),
            }
            let msg = match UserMessageHeader::decode(&header) {
                Some(msg) => msg,
                None => {
                    // lost sync on the control stream, slide one byte
                    receiver.remove(1)?;
                    continue;
                }
            };
            match msg.message_type {
                USER_MESSAGE_LOG_LEVEL => {
                    let mut body = [0u8; LogLevelChangedBody::SIZE];
                    let take = GetFlags {
                        skip_header: true,
                        consume: true,
                    };
                    match receiver.check_and_get(&mut body, take) {
                        Ok(()) => {}
                        Err(DltError::NotEnoughData) => break,
                        Err(e) => return Err(e),
                    }
                    if let Some(body) = LogLevelChangedBody::decode(&body) {
                        self.apply_log_level(body);
                    }
                }
                USER_MESSAGE_INJECTION => {
                    let mut fixed = [0u8; InjectionBody::SIZE];
                    let peek_body = GetFlags {
                        skip_header: true,
                        consume: false,
                    };
                    match receiver.check_and_get(&mut fixed, peek_body) {
                        Ok(()) => {}
                        Err(DltError::NotEnoughData) => break,
                        Err(e) => return Err(e),
                    }
                    let body = match InjectionBody::decode(&fixed) {
                        Some(body) => body,
                        None => break,
                    };
                    let total = InjectionBody::SIZE + body.data_length as usize;
                    if USER_HEADER_SIZE + total > receiver.capacity() {
                        // A length the buffer can never hold is a corrupt
                        // claim, not a partial message: drop the header and
                        // fixed body and rescan so the stream stays live.
                        log::warn!(
                            "[USR] injection for service {:#x} claims {} bytes, \
                             over receiver capacity",
                            body.service_id,
                            body.data_length
                        );
                        receiver.remove(USER_HEADER_SIZE + InjectionBody::SIZE)?;
                        continue;
                    }
                    let mut full = vec![0u8; total];
                    let take = GetFlags {
                        skip_header: true,
                        consume: true,
                    };
                    match receiver.check_and_get(&mut full, take) {
                        Ok(()) => {}
                        Err(DltError::NotEnoughData) => break,
                        Err(e) => return Err(e),
                    }
                    self.dispatch_injection(body, &full[InjectionBody::SIZE..]);
                }
                USER_MESSAGE_LOG_STATE => {
                    let mut body = [0u8; 1];
                    let take = GetFlags {
                        skip_header: true,
                        consume: true,
                    };
                    match receiver.check_and_get(&mut body, take) {
                        Ok(()) => {}
                        Err(DltError::NotEnoughData) => break,
                        Err(e) => return Err(e),
                    }
                    let connected = body[0] != 0;
                    self.inner.lock().log_state_connected = connected;
                    log::debug!("[USR] daemon log state: connected={connected}");
                }
                other => {
                    // unknown control type: length unknown, drop the header
                    // and let the pattern scan find the next message
                    log::warn!("[USR] unknown daemon message type {other}");
                    receiver.remove(USER_HEADER_SIZE)?;
                }
            }
            handled += 1;
        }
        receiver.move_to_begin();
        Ok(handled)
    }

    fn apply_log_level(&self, body: LogLevelChangedBody) {
        let (level, status) = match (
            LogLevel::from_raw(body.log_level),
            TraceStatus::from_raw(body.trace_status),
        ) {
            (Ok(level), Ok(status)) => (level, status),
            _ => {
                log::warn!(
                    "[USR] daemon sent out-of-range level {}/{}",
                    body.log_level,
                    body.trace_status
                );
                return;
            }
        };
        let index = body.log_level_pos;
        let taken = {
            let mut inner = self.inner.lock();
            let slot = match usize::try_from(index)
                .ok()
                .and_then(|i| inner.contexts.get_mut(i))
            {
                Some(slot) if slot.occupied => slot,
                _ => {
                    log::warn!("[USR] level change for unknown slot {index}");
                    return;
                }
            };
            slot.log_level = level;
            slot.trace_status = status;
            log::debug!("[USR] context {} level set to {level}", slot.id);
            slot.on_level_changed.take().map(|cb| (slot.id, cb))
        };
        // callback runs unlocked so it is free to log
        if let Some((id, mut cb)) = taken {
            cb(id, level, status);
            let mut inner = self.inner.lock();
            if let Some(slot) = inner.contexts.iter_mut().find(|s| s.occupied && s.id == id) {
                if slot.on_level_changed.is_none() {
                    slot.on_level_changed = Some(cb);
                }
            }
        }
    }

    fn dispatch_injection(&self, body: InjectionBody, data: &[u8]) {
        let taken = {
            let inner = &mut *self.inner.lock();
            if inner.config.disable_injection {
                return;
            }
            let slot = match usize::try_from(body.log_level_pos)
                .ok()
                .and_then(|i| inner.contexts.get_mut(i))
            {
                Some(slot) if slot.occupied => slot,
                _ => return,
            };
            match slot
                .injections
                .iter()
                .position(|i| i.service_id == body.service_id)
            {
                Some(pos) => Some((slot.id, slot.injections.swap_remove(pos))),
                None => None,
            }
        };
        if let Some((id, mut injection)) = taken {
            (injection.callback)(body.service_id, data);
            let mut inner = self.inner.lock();
            if let Some(slot) = inner.contexts.iter_mut().find(|s| s.occupied && s.id == id) {
                slot.injections.push(injection);
            }
        }
    }
}

/// `true` when a message at `candidate` passes a context configured at
/// `configured`. `Default` falls back to Info; equality passes.
fn level_passes(configured: LogLevel, candidate: LogLevel) -> bool {
    let effective = match configured {
        LogLevel::Default => LogLevel::Info,
        other => other,
    };
    effective != LogLevel::Off && candidate.as_raw() <= effective.as_raw()
}

fn resolve_mut<'a>(inner: &'a mut Inner, ctx: &Context) -> Result<&'a mut Slot> {
    match inner.contexts.get_mut(ctx.index) {
        Some(slot) if slot.occupied && slot.generation == ctx.generation => Ok(slot),
        _ => Err(DltError::WrongParameter("stale context handle")),
    }
}

fn timestamp_now(inner: &Inner) -> u32 {
    (inner.start.elapsed().as_micros() / 100) as u32
}

/// Encode one outgoing frame (standard header onward) for a context slot, or
/// for the process itself when `ctx` is `None`.
#[allow(clippy::too_many_arguments)]
fn build_frame(
    inner: &mut Inner,
    ctx: Option<&Context>,
    mstp: u8,
    mtin: u8,
    verbose: bool,
    noar: u8,
    payload: Vec<u8>,
    timestamp: Option<u32>,
) -> Result<Vec<u8>> {
    let (ctid, mcnt) = match ctx {
        Some(ctx) => {
            let slot = resolve_mut(inner, ctx)?;
            let mcnt = slot.mcnt;
            slot.mcnt = slot.mcnt.wrapping_add(1);
            (slot.id, mcnt)
        }
        None => {
            let mcnt = inner.marker_mcnt;
            inner.marker_mcnt = inner.marker_mcnt.wrapping_add(1);
            (DltId::new(OVERFLOW_CTID), mcnt)
        }
    };
    let msbf = host_is_msbf();
    let use_extended = verbose;
    let htyp = StandardHeader::make_htyp(
        use_extended,
        msbf,
        inner.config.with_ecu_id,
        inner.config.with_session_id,
        inner.config.with_timestamp,
    );
    let message = Message {
        storage: None,
        standard: StandardHeader { htyp, mcnt, len: 0 },
        extra: HeaderExtra {
            ecu: inner.config.with_ecu_id.then_some(inner.ecu),
            session_id: inner.config.with_session_id.then_some(inner.session_id),
            timestamp: inner
                .config
                .with_timestamp
                .then(|| timestamp.unwrap_or_else(|| timestamp_now(inner))),
        },
        extended: use_extended.then_some(ExtendedHeader {
            msin: ExtendedHeader::make_msin(mstp, mtin, verbose),
            noar,
            apid: inner.app,
            ctid,
        }),
        payload,
    };
    message.encode_wire()
}

fn local_print(inner: &Inner, frame: &[u8]) {
    let active = match inner.config.local_print_mode {
        LocalPrintMode::ForceOn => true,
        LocalPrintMode::Automatic => inner.link.is_none(),
        LocalPrintMode::Unset | LocalPrintMode::ForceOff => false,
    };
    if active {
        log::info!("[USR] local print: {} byte frame buffered", frame.len());
    }
}

/// Route one encoded frame: out through the link when attached (draining any
/// backlog first to keep FIFO order), into the startup buffer otherwise.
/// Backpressure parks the frame in the buffer; a dead pipe or a full buffer
/// drops it and bumps the overflow counter.
pub(crate) fn route_locked(inner: &mut Inner, frame: &[u8]) -> Result<()> {
    if inner.link.is_some() && inner.buffer.message_count() > 0 {
        // older frames go first; ignore a stalled drain, the push below
        // keeps order by landing behind them
        let _ = drain_locked(inner);
    }
    let mut link = inner.link.take();
    let result = match link.as_mut() {
        Some(link) if inner.buffer.message_count() == 0 => match link.write_frame(frame) {
            Ok(()) => Ok(()),
            Err(DltError::PipeFull) => park(inner, frame),
            Err(DltError::PipeError) => {
                inner.overflow_counter += 1;
                Err(DltError::PipeError)
            }
            Err(e) => Err(e),
        },
        // backlog remains after the drain attempt, stay behind it
        Some(_) => park(inner, frame),
        None => {
            local_print(inner, frame);
            park(inner, frame)
        }
    };
    inner.link = link;
    if result.is_ok() {
        maybe_send_overflow_marker(inner);
    }
    result
}

/// After any successful delivery with an empty backlog, report frames that
/// were dropped in between.
fn maybe_send_overflow_marker(inner: &mut Inner) {
    if inner.link.is_none()
        || inner.overflow_counter == 0
        || inner.buffer.message_count() > 0
    {
        return;
    }
    let lost = inner.overflow_counter;
    inner.overflow_counter = 0;
    if let Ok(frame) = overflow_frame(inner, lost) {
        if route_locked(inner, &frame).is_ok() {
            log::debug!("[USR] overflow marker sent, {lost} frames were lost");
        }
    }
}

fn park(inner: &mut Inner, frame: &[u8]) -> Result<()> {
    match inner.buffer.push(frame) {
        Ok(()) => Ok(()),
        Err(DltError::BufferFull) => {
            inner.overflow_counter += 1;
            Err(DltError::BufferFull)
        }
        Err(e) => Err(e),
    }
}

/// Drain the startup buffer through the attached link, oldest first. Stops
/// on backpressure keeping the rest buffered. After a complete drain an
/// overflow marker frame reports any frames dropped in between.
pub(crate) fn drain_locked(inner: &mut Inner) -> Result<usize> {
    let mut link = match inner.link.take() {
        Some(link) => link,
        None => return Ok(0),
    };
    let mut scratch = vec![0u8; RESEND_BUF_MAX_SIZE];
    let mut sent = 0usize;
    let result = loop {
        match inner.buffer.copy(&mut scratch) {
            Ok(None) => break Ok(sent),
            Ok(Some(n)) => match link.write_frame(&scratch[..n]) {
                Ok(()) => match inner.buffer.remove() {
                    Ok(_) => sent += 1,
                    Err(e) => break Err(e),
                },
                Err(e) => break Err(e),
            },
            Err(e) => break Err(e),
        }
    };
    inner.link = Some(link);
    if result.is_ok() {
        maybe_send_overflow_marker(inner);
    }
    if sent > 0 {
        log::debug!("[USR] drained {sent} buffered frames");
    }
    result
}

fn overflow_frame(inner: &mut Inner, lost: u32) -> Result<Vec<u8>> {
    let msbf = host_is_msbf();
    let mut body = Vec::new();
    let text = format!("{lost} messages lost");
    argument::write_str(&mut body, &text, msbf, &Attributes::default());
    let mtin = LogLevel::Warn.as_raw() as u8;
    build_frame(inner, None, TYPE_LOG, mtin, true, 1, body, None)
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// In-progress log message. Appends accumulate arguments against the
/// configured payload budget; an append that would overflow it fails with
/// [`DltError::UserBufferFull`] and leaves the message unchanged.
pub struct MessageBuilder {
    context: Context,
    level: LogLevel,
    verbose: bool,
    msbf: bool,
    budget: usize,
    noar: u8,
    payload: Vec<u8>,
    timestamp: Option<u32>,
}

macro_rules! builder_int {
    ($name:ident, $name_attr:ident, $ty:ty, $writer:ident) => {
        pub fn $name(&mut self, value: $ty) -> Result<()> {
            self.$name_attr(value, &Attributes::default())
        }

        pub fn $name_attr(&mut self, value: $ty, attrs: &Attributes<'_>) -> Result<()> {
            if self.verbose {
                self.push_arg(|buf, msbf| argument::$writer(buf, value, msbf, attrs))
            } else {
                self.push_plain(&value.to_le_bytes())
            }
        }
    };
}

impl MessageBuilder {
    fn new(
        context: Context,
        level: LogLevel,
        verbose: bool,
        budget: usize,
        message_id: Option<u32>,
    ) -> Self {
        let mut payload = Vec::new();
        if let Some(id) = message_id {
            // non-verbose payloads start with the message id
            put_u32(&mut payload, id, host_is_msbf());
        }
        Self {
            context,
            level,
            verbose,
            msbf: host_is_msbf(),
            budget,
            noar: 0,
            payload,
            timestamp: None,
        }
    }

    /// Override the header timestamp (0.1 ms units since system start).
    pub fn with_timestamp(&mut self, timestamp: u32) {
        self.timestamp = Some(timestamp);
    }

    /// Payload bytes still available under the budget.
    pub fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.payload.len())
    }

    pub fn argument_count(&self) -> u8 {
        self.noar
    }

    fn push_arg(&mut self, write: impl FnOnce(&mut Vec<u8>, bool)) -> Result<()> {
        let before = self.payload.len();
        write(&mut self.payload, self.msbf);
        if self.payload.len() > self.budget {
            self.payload.truncate(before);
            return Err(DltError::UserBufferFull);
        }
        self.noar += 1;
        Ok(())
    }

    /// Non-verbose append: value bytes only, no type information.
    fn push_plain(&mut self, bytes: &[u8]) -> Result<()> {
        if self.payload.len() + bytes.len() > self.budget {
            return Err(DltError::UserBufferFull);
        }
        if self.msbf {
            self.payload.extend(bytes.iter().rev());
        } else {
            self.payload.extend_from_slice(bytes);
        }
        self.noar += 1;
        Ok(())
    }

    pub fn append_bool(&mut self, value: bool) -> Result<()> {
        self.append_bool_attr(value, &Attributes::default())
    }

    pub fn append_bool_attr(&mut self, value: bool, attrs: &Attributes<'_>) -> Result<()> {
        if self.verbose {
            self.push_arg(|buf, msbf| argument::write_bool(buf, value, msbf, attrs))
        } else {
            self.push_plain(&[value as u8])
        }
    }

    builder_int!(append_i8, append_i8_attr, i8, write_i8);
    builder_int!(append_i16, append_i16_attr, i16, write_i16);
    builder_int!(append_i32, append_i32_attr, i32, write_i32);
    builder_int!(append_i64, append_i64_attr, i64, write_i64);
    builder_int!(append_u8, append_u8_attr, u8, write_u8);
    builder_int!(append_u16, append_u16_attr, u16, write_u16);
    builder_int!(append_u32, append_u32_attr, u32, write_u32);
    builder_int!(append_u64, append_u64_attr, u64, write_u64);

    pub fn append_f32(&mut self, value: f32) -> Result<()> {
        self.append_f32_attr(value, &Attributes::default())
    }

    pub fn append_f32_attr(&mut self, value: f32, attrs: &Attributes<'_>) -> Result<()> {
        if self.verbose {
            self.push_arg(|buf, msbf| argument::write_f32(buf, value, msbf, attrs))
        } else {
            self.push_plain(&value.to_le_bytes())
        }
    }

    pub fn append_f64(&mut self, value: f64) -> Result<()> {
        self.append_f64_attr(value, &Attributes::default())
    }

    pub fn append_f64_attr(&mut self, value: f64, attrs: &Attributes<'_>) -> Result<()> {
        if self.verbose {
            self.push_arg(|buf, msbf| argument::write_f64(buf, value, msbf, attrs))
        } else {
            self.push_plain(&value.to_le_bytes())
        }
    }

    pub fn append_str(&mut self, value: &str) -> Result<()> {
        self.append_str_attr(value, &Attributes::default())
    }

    pub fn append_str_attr(&mut self, value: &str, attrs: &Attributes<'_>) -> Result<()> {
        if self.verbose {
            self.push_arg(|buf, msbf| argument::write_str(buf, value, msbf, attrs))
        } else {
            let mut plain = Vec::with_capacity(value.len() + 3);
            put_u16(&mut plain, (value.len() + 1) as u16, self.msbf);
            plain.extend_from_slice(value.as_bytes());
            plain.push(0);
            if self.payload.len() + plain.len() > self.budget {
                return Err(DltError::UserBufferFull);
            }
            self.payload.extend_from_slice(&plain);
            self.noar += 1;
            Ok(())
        }
    }

    pub fn append_raw(&mut self, value: &[u8]) -> Result<()> {
        self.append_raw_attr(value, &Attributes::default())
    }

    pub fn append_raw_attr(&mut self, value: &[u8], attrs: &Attributes<'_>) -> Result<()> {
        if self.verbose {
            self.push_arg(|buf, msbf| argument::write_raw(buf, value, msbf, attrs))
        } else {
            let mut plain = Vec::with_capacity(value.len() + 2);
            put_u16(&mut plain, value.len() as u16, self.msbf);
            plain.extend_from_slice(value);
            if self.payload.len() + plain.len() > self.budget {
                return Err(DltError::UserBufferFull);
            }
            self.payload.extend_from_slice(&plain);
            self.noar += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::DecodeOutcome;
    use crate::protocol::ArgumentValue;
    use crate::receiver::ReceiverKind;
    use crate::transport::{FailMode, MemoryLink};
    use std::io::Cursor;
    use std::sync::mpsc;

    fn state() -> UserState {
        let config = UserConfig {
            with_timestamp: false,
            ..UserConfig::default()
        };
        UserState::new("APP1", "test application", config).unwrap()
    }

    fn decode_frame(frame: &[u8]) -> Message {
        match Message::decode_wire(frame) {
            DecodeOutcome::Frame { message, consumed } => {
                assert_eq!(consumed, frame.len());
                message
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn register_log_and_capture() {
        let state = state();
        let ctx = state.register_context("CTX1", "first context").unwrap();

        let mut msg = state.log_start(&ctx, LogLevel::Info).unwrap().unwrap();
        msg.append_str("hello").unwrap();
        msg.append_u32(42).unwrap();
        state.log_finish(msg).unwrap();
        assert_eq!(state.buffered_messages(), 1);

        let link = MemoryLink::new();
        let frames = link.frames();
        assert_eq!(state.connect(Box::new(link)).unwrap(), 1);
        assert_eq!(state.buffered_messages(), 0);

        let captured = frames.lock().clone();
        assert_eq!(captured.len(), 1);
        let message = decode_frame(&captured[0]);
        let extended = message.extended.unwrap();
        assert!(extended.is_verbose());
        assert_eq!(extended.noar, 2);
        assert_eq!(extended.apid, DltId::new("APP1"));
        assert_eq!(extended.ctid, DltId::new("CTX1"));
        let args =
            argument::read_arguments(&message.payload, 2, message.standard.is_msbf()).unwrap();
        assert_eq!(args[0].value, ArgumentValue::String("hello".into()));
        assert_eq!(args[1].value, ArgumentValue::Unsigned(42));
    }

    #[test]
    fn connected_frames_bypass_buffer() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        let link = MemoryLink::new();
        let frames = link.frames();
        state.connect(Box::new(link)).unwrap();

        let mut msg = state.log_start(&ctx, LogLevel::Warn).unwrap().unwrap();
        msg.append_bool(true).unwrap();
        state.log_finish(msg).unwrap();

        assert_eq!(state.buffered_messages(), 0);
        assert_eq!(frames.lock().len(), 1);
    }

    #[test]
    fn level_filter_skips_encoding() {
        let state = state();
        let ctx = state
            .register_context_ll_ts("CTX1", "", LogLevel::Error, TraceStatus::Off)
            .unwrap();
        assert!(state.is_level_enabled(&ctx, LogLevel::Fatal));
        assert!(state.is_level_enabled(&ctx, LogLevel::Error));
        assert!(!state.is_level_enabled(&ctx, LogLevel::Info));
        assert!(state.log_start(&ctx, LogLevel::Debug).unwrap().is_none());
        assert!(state.log_start(&ctx, LogLevel::Error).unwrap().is_some());
        assert!(state.log_start(&ctx, LogLevel::Off).is_err());
    }

    #[test]
    fn stale_handle_rejected() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        state.unregister_context(&ctx).unwrap();
        assert!(matches!(
            state.log_start(&ctx, LogLevel::Info),
            Err(DltError::WrongParameter(_))
        ));

        // slot reuse bumps the generation, old handle stays dead
        let ctx2 = state.register_context("CTX2", "").unwrap();
        assert!(state.log_start(&ctx, LogLevel::Info).is_err());
        assert!(state.log_start(&ctx2, LogLevel::Info).unwrap().is_some());
    }

    #[test]
    fn duplicate_context_rejected() {
        let state = state();
        let _ctx = state.register_context("CTX1", "").unwrap();
        assert!(state.register_context("CTX1", "again").is_err());
    }

    #[test]
    fn builder_enforces_budget() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        let mut msg = state.log_start(&ctx, LogLevel::Info).unwrap().unwrap();
        let big = "x".repeat(USER_BUF_MAX_SIZE);
        assert!(matches!(
            msg.append_str(&big),
            Err(DltError::UserBufferFull)
        ));
        // failed append leaves the message usable
        msg.append_str("small").unwrap();
        assert_eq!(msg.argument_count(), 1);
        state.log_finish(msg).unwrap();
    }

    #[test]
    fn log_string_splits_long_text() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        let text = "a".repeat(3 * USER_BUF_MAX_SIZE);
        state.log_string(&ctx, LogLevel::Info, &text).unwrap();
        assert!(state.buffered_messages() >= 3);

        let link = MemoryLink::new();
        let frames = link.frames();
        state.connect(Box::new(link)).unwrap();
        let captured = frames.lock().clone();
        let mut total = String::new();
        for frame in &captured {
            let message = decode_frame(frame);
            let args =
                argument::read_arguments(&message.payload, 1, message.standard.is_msbf()).unwrap();
            match &args[0].value {
                ArgumentValue::String(s) => total.push_str(s),
                other => panic!("expected string, got {other:?}"),
            }
        }
        assert_eq!(total, text);
    }

    #[test]
    fn non_verbose_carries_message_id() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        let mut msg = state.log_start_id(&ctx, LogLevel::Info, 0xBEEF).unwrap().unwrap();
        msg.append_u16(7).unwrap();
        state.log_finish(msg).unwrap();

        let link = MemoryLink::new();
        let frames = link.frames();
        state.connect(Box::new(link)).unwrap();
        let captured = frames.lock().clone();
        let message = decode_frame(&captured[0]);
        assert!(message.extended.is_none());
        assert_eq!(&message.payload[..4], &0xBEEFu32.to_le_bytes());
        assert_eq!(&message.payload[4..6], &7u16.to_le_bytes());
    }

    #[test]
    fn pipe_full_parks_frame_in_buffer() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        let link = MemoryLink::new();
        let frames = link.frames();
        state.connect(Box::new(link.clone())).unwrap();

        link.fail_next(FailMode::PipeFull);
        let mut msg = state.log_start(&ctx, LogLevel::Info).unwrap().unwrap();
        msg.append_u8(1).unwrap();
        state.log_finish(msg).unwrap();
        assert_eq!(state.buffered_messages(), 1);
        assert_eq!(frames.lock().len(), 0);

        // next send drains the parked frame first
        let mut msg = state.log_start(&ctx, LogLevel::Info).unwrap().unwrap();
        msg.append_u8(2).unwrap();
        state.log_finish(msg).unwrap();
        assert_eq!(state.buffered_messages(), 0);
        let captured = frames.lock().clone();
        assert_eq!(captured.len(), 2);
        assert_eq!(decode_frame(&captured[0]).standard.mcnt, 0);
        assert_eq!(decode_frame(&captured[1]).standard.mcnt, 1);
    }

    #[test]
    fn pipe_error_drops_and_counts() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        let link = MemoryLink::new();
        state.connect(Box::new(link.clone())).unwrap();

        link.fail_next(FailMode::PipeError);
        let mut msg = state.log_start(&ctx, LogLevel::Info).unwrap().unwrap();
        msg.append_u8(1).unwrap();
        assert!(matches!(
            state.log_finish(msg),
            Err(DltError::PipeError)
        ));
        assert_eq!(state.overflow_count(), 1);
        assert_eq!(state.buffered_messages(), 0);
    }

    #[test]
    fn drain_reports_overflow() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        let link = MemoryLink::new();
        let frames = link.frames();
        state.connect(Box::new(link.clone())).unwrap();

        link.fail_next(FailMode::PipeError);
        let mut msg = state.log_start(&ctx, LogLevel::Info).unwrap().unwrap();
        msg.append_u8(1).unwrap();
        let _ = state.log_finish(msg);
        assert_eq!(state.overflow_count(), 1);

        // next successful drain emits the marker frame
        let mut msg = state.log_start(&ctx, LogLevel::Info).unwrap().unwrap();
        msg.append_u8(2).unwrap();
        state.log_finish(msg).unwrap();
        assert_eq!(state.overflow_count(), 0);

        let captured = frames.lock().clone();
        let marker = captured
            .iter()
            .map(|f| decode_frame(f))
            .find(|m| {
                m.extended
                    .map(|e| e.ctid == DltId::new(OVERFLOW_CTID))
                    .unwrap_or(false)
            })
            .expect("overflow marker frame");
        let args =
            argument::read_arguments(&marker.payload, 1, marker.standard.is_msbf()).unwrap();
        assert_eq!(args[0].value, ArgumentValue::String("1 messages lost".into()));
    }

    #[test]
    fn atexit_flush_empties_buffer() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        for i in 0..5u8 {
            let mut msg = state.log_start(&ctx, LogLevel::Info).unwrap().unwrap();
            msg.append_u8(i).unwrap();
            state.log_finish(msg).unwrap();
        }
        assert_eq!(state.buffered_messages(), 5);

        // without a link the flush gives up immediately
        assert_eq!(state.atexit_flush(Duration::from_millis(50)), 5);

        let link = MemoryLink::new();
        let frames = link.frames();
        state.disconnect();
        {
            let mut inner = state.inner.lock();
            inner.link = Some(Box::new(link));
        }
        assert_eq!(state.atexit_flush(Duration::from_millis(50)), 0);
        assert_eq!(frames.lock().len(), 5);
    }

    fn control_stream(parts: &[Vec<u8>]) -> Receiver<Cursor<Vec<u8>>> {
        let mut bytes = Vec::new();
        for part in parts {
            bytes.extend_from_slice(part);
        }
        let mut rcv = Receiver::new(Cursor::new(bytes), ReceiverKind::Fd, 4096).unwrap();
        rcv.receive().unwrap();
        rcv
    }

    fn log_level_message(pos: i32, level: i8, status: i8) -> Vec<u8> {
        let mut buf = Vec::new();
        UserMessageHeader {
            message_type: USER_MESSAGE_LOG_LEVEL,
        }
        .encode_into(&mut buf);
        LogLevelChangedBody {
            log_level_pos: pos,
            log_level: level,
            trace_status: status,
        }
        .encode_into(&mut buf);
        buf
    }

    #[test]
    fn daemon_log_level_change_applies() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        let (tx, rx) = mpsc::channel();
        state
            .register_log_level_changed_callback(&ctx, move |id, level, status| {
                tx.send((id, level, status)).ok();
            })
            .unwrap();

        let mut rcv = control_stream(&[log_level_message(0, 2, 1)]);
        assert_eq!(state.process_daemon_messages(&mut rcv).unwrap(), 1);
        assert_eq!(state.context_log_level(&ctx).unwrap(), LogLevel::Error);
        let (id, level, status) = rx.try_recv().unwrap();
        assert_eq!(id, DltId::new("CTX1"));
        assert_eq!(level, LogLevel::Error);
        assert_eq!(status, TraceStatus::On);
    }

    #[test]
    fn daemon_injection_dispatches() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        let (tx, rx) = mpsc::channel();
        state
            .register_injection_callback(&ctx, 0x1000, move |service, data| {
                tx.send((service, data.to_vec())).ok();
            })
            .unwrap();

        let mut buf = Vec::new();
        UserMessageHeader {
            message_type: USER_MESSAGE_INJECTION,
        }
        .encode_into(&mut buf);
        InjectionBody {
            log_level_pos: 0,
            service_id: 0x1000,
            data_length: 3,
        }
        .encode_into(&mut buf);
        buf.extend_from_slice(b"abc");

        let mut rcv = control_stream(&[buf]);
        assert_eq!(state.process_daemon_messages(&mut rcv).unwrap(), 1);
        assert_eq!(rx.try_recv().unwrap(), (0x1000, b"abc".to_vec()));
    }

    #[test]
    fn oversized_injection_claim_does_not_wedge_control_stream() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();

        // Injection claiming more data than the receiver buffer can ever
        // hold, then a level change queued behind it. The claim must be
        // dropped, not waited for, so the level change still applies.
        let mut bogus = Vec::new();
        UserMessageHeader {
            message_type: USER_MESSAGE_INJECTION,
        }
        .encode_into(&mut bogus);
        InjectionBody {
            log_level_pos: 0,
            service_id: 0x1000,
            data_length: 1_000_000,
        }
        .encode_into(&mut bogus);

        let mut rcv = control_stream(&[bogus, log_level_message(0, 2, 1)]);
        assert_eq!(state.process_daemon_messages(&mut rcv).unwrap(), 1);
        assert_eq!(state.context_log_level(&ctx).unwrap(), LogLevel::Error);
        assert_eq!(rcv.available(), 0);
    }

    #[test]
    fn reserved_injection_id_rejected() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        assert!(state
            .register_injection_callback(&ctx, 0x100, |_, _| {})
            .is_err());
    }

    #[test]
    fn partial_control_message_stays_buffered() {
        let state = state();
        let _ctx = state.register_context("CTX1", "").unwrap();
        let full = log_level_message(0, 5, 0);
        let mut rcv = control_stream(&[full[..full.len() - 2].to_vec()]);
        assert_eq!(state.process_daemon_messages(&mut rcv).unwrap(), 0);
        // header stays queued until the rest arrives
        assert_eq!(rcv.available(), full.len() - 2);
    }

    #[test]
    fn control_stream_resyncs_on_garbage() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        let mut rcv = control_stream(&[b"??".to_vec(), log_level_message(0, 6, 0)]);
        assert_eq!(state.process_daemon_messages(&mut rcv).unwrap(), 1);
        assert_eq!(state.context_log_level(&ctx).unwrap(), LogLevel::Verbose);
    }

    #[test]
    fn log_state_tracks_daemon_client() {
        let state = state();
        assert!(!state.daemon_logging_enabled());
        let mut buf = Vec::new();
        UserMessageHeader {
            message_type: USER_MESSAGE_LOG_STATE,
        }
        .encode_into(&mut buf);
        buf.push(1);
        let mut rcv = control_stream(&[buf]);
        state.process_daemon_messages(&mut rcv).unwrap();
        assert!(state.daemon_logging_enabled());
    }

    #[test]
    fn segmented_trace_frames_complete_transfer() {
        let state = state();
        let ctx = state
            .register_context_ll_ts("CTX1", "", LogLevel::Default, TraceStatus::On)
            .unwrap();
        let payload = vec![0xABu8; SEGMENT_CHUNK_SIZE * 2 + 100];
        state
            .trace_network_segmented(&ctx, NW_TRACE_ETHERNET, b"hdr", &payload)
            .unwrap();

        // worker routes into the startup buffer; wait for it
        let deadline = Instant::now() + Duration::from_secs(2);
        while state.buffered_messages() < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        // start + 3 chunks + end
        assert_eq!(state.buffered_messages(), 5);
    }

    #[test]
    fn segmented_payload_over_chunk_count_limit_rejected() {
        let state = state();
        let ctx = state
            .register_context_ll_ts("CTX1", "", LogLevel::Default, TraceStatus::On)
            .unwrap();
        let payload = vec![0u8; SEGMENT_CHUNK_SIZE * usize::from(u16::MAX) + 1];
        assert!(matches!(
            state.trace_network_segmented(&ctx, NW_TRACE_ETHERNET, b"hdr", &payload),
            Err(DltError::WrongParameter(_))
        ));
        assert_eq!(state.buffered_messages(), 0);
    }

    #[test]
    fn trace_status_off_drops_traces() {
        let state = state();
        let ctx = state.register_context("CTX1", "").unwrap();
        state
            .trace_network(&ctx, NW_TRACE_CAN, b"hdr", b"payload")
            .unwrap();
        assert_eq!(state.buffered_messages(), 0);
    }
}
