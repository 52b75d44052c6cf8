//! The connection core: the delegate the frame transport notifies for
//! every decoded frame and transport event. It owns the protocol state
//! machine and mediates between the codec, the accumulator, the
//! pending-query slot, and the caller-visible completions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::constant::{CapabilityFlags, CAPABILITIES_ALWAYS_ENABLED};
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::command::{self, PrepareOk};
use crate::protocol::handshake::{self, HandshakeResponse41};
use crate::protocol::message::{self, DecodeContext, ServerMessage};
use crate::protocol::packet;
use crate::resultset::QueryResult;
use crate::value::Value;
use crate::version::ServerVersion;

use super::accumulator::ResultSetAccumulator;
use super::pending::{Completion, InFlight, PendingSlot};
use super::timeout;
use super::transport::WriteCmd;

const MAX_PACKET_SIZE: u32 = 0x0100_0000;

/// Primary states of the connection state machine.
#[derive(Debug)]
pub(crate) enum Phase {
    Disconnected,
    Connecting,
    AwaitingHandshake,
    /// Also covers the auth-switch sub-state: switch requests arrive and
    /// are answered without leaving this phase.
    AwaitingHandshakeResult,
    Ready,
    Querying(QueryPhase),
    Closed,
}

/// Sub-states while a query is in flight.
#[derive(Debug)]
pub(crate) enum QueryPhase {
    /// Awaiting the first frame of a COM_QUERY response.
    TextResponse,
    TextColumns,
    TextRows,
    /// Awaiting the first frame of a COM_STMT_PREPARE response.
    PrepareResponse { sql: String, values: Vec<Value> },
    /// Draining parameter/column definition blocks of a prepare response.
    PrepareDefinitions {
        remaining_defs: u32,
        remaining_eofs: u8,
        action: PrepareAction,
    },
    /// Awaiting the first frame of a COM_STMT_EXECUTE response.
    BinaryResponse,
    BinaryColumns,
    BinaryRows,
}

/// What to do once a prepare response is fully drained.
#[derive(Debug)]
pub(crate) enum PrepareAction {
    Execute {
        statement: CachedStatement,
        values: Vec<Value>,
    },
    /// The server's parameter count disagreed with the supplied values;
    /// the orphaned statement is closed and the query fails.
    Fail { statement_id: u32, error: Error },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CachedStatement {
    pub statement_id: u32,
    pub num_params: u16,
}

/// State mutated only under the connection lock. Delegate callbacks are
/// serialized by this lock, which keeps transitions in wire order.
#[derive(Debug)]
pub(crate) struct Core {
    pub phase: Phase,
    pub writer: Option<mpsc::UnboundedSender<WriteCmd>>,
    pub server_version: Option<ServerVersion>,
    pub last_error: Option<Error>,
    /// `Some` when the teardown carries a failure the disconnect future
    /// should deliver.
    close_outcome: Option<Error>,
    pub accumulator: ResultSetAccumulator,
    statements: HashMap<String, CachedStatement>,
}

pub(crate) struct ConnInner {
    pub count: u64,
    pub id: String,
    pub opts: Opts,
    pub charset_id: u8,
    pub state: Mutex<Core>,
    pub pending: PendingSlot,
    pub connected: AtomicBool,
    pub timed_out: AtomicBool,
    pub in_transaction: AtomicBool,
    pub connect_done: Completion<Result<()>>,
    pub disconnect_done: Completion<Result<()>>,
}

impl ConnInner {
    pub fn new(count: u64, id: String, opts: Opts, charset_id: u8) -> Self {
        Self {
            count,
            id,
            opts,
            charset_id,
            state: Mutex::new(Core {
                phase: Phase::Disconnected,
                writer: None,
                server_version: None,
                last_error: None,
                close_outcome: None,
                accumulator: ResultSetAccumulator::new(),
                statements: HashMap::new(),
            }),
            pending: PendingSlot::new(),
            connected: AtomicBool::new(false),
            timed_out: AtomicBool::new(false),
            in_transaction: AtomicBool::new(false),
            connect_done: Completion::new(),
            disconnect_done: Completion::new(),
        }
    }

    pub fn lock_state(&self) -> MutexGuard<'_, Core> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ------------------------------------------------------------------
    // Delegate callbacks (invoked by the frame transport)
    // ------------------------------------------------------------------

    /// One decoded frame, in wire order. An `Err` from here is a protocol
    /// violation the transport treats as fatal; server-reported errors
    /// and unexpected-but-harmless frames are handled internally.
    pub fn handle_frame(&self, sequence_id: u8, payload: &[u8]) -> Result<()> {
        let mut core = self.lock_state();

        // No request in flight: classify best-effort, log, and drop. An
        // idle connection must not die over a stray frame.
        if matches!(
            core.phase,
            Phase::Disconnected | Phase::Connecting | Phase::Ready | Phase::Closed
        ) {
            match message::decode(DecodeContext::Idle, payload) {
                Ok(msg) => {
                    warn!(id = %self.id, ?msg, "dropping unexpected server message")
                }
                Err(_) => {
                    warn!(id = %self.id, len = payload.len(), "dropping undecodable idle frame")
                }
            }
            return Ok(());
        }

        let msg = message::decode(core.decode_context(), payload)?;

        let phase = std::mem::replace(&mut core.phase, Phase::Closed);
        core.phase = self.transition(&mut core, phase, msg, sequence_id)?;
        Ok(())
    }

    /// Fatal transport failure: fail everything still pending and move to
    /// `Closed`. Idempotent once closed.
    pub fn handle_transport_error(&self, err: Error) {
        {
            let mut core = self.lock_state();
            if matches!(core.phase, Phase::Closed) {
                return;
            }
            warn!(id = %self.id, error = %err, "transport error");
            core.last_error = Some(err.clone());
            core.close_outcome = Some(err.clone());
            core.phase = Phase::Closed;
            core.writer = None;
            core.accumulator.clear();
            self.connected.store(false, Ordering::SeqCst);
        }
        self.connect_done.complete(Err(err.clone()));
        if let Some(inflight) = self.pending.take() {
            inflight.complete(Err(err.clone()));
        }
        self.disconnect_done.complete(Err(err));
    }

    // ------------------------------------------------------------------
    // State transitions
    // ------------------------------------------------------------------

    fn transition(
        &self,
        core: &mut Core,
        phase: Phase,
        msg: ServerMessage,
        sequence_id: u8,
    ) -> Result<Phase> {
        match (phase, msg) {
            // -- connection establishment --------------------------------
            (Phase::AwaitingHandshake, ServerMessage::Handshake(h)) => {
                self.on_handshake(core, h, sequence_id)
            }
            (Phase::AwaitingHandshake, ServerMessage::Error(err)) => {
                Ok(self.fail_connect(core, err.into()))
            }

            (Phase::AwaitingHandshakeResult, ServerMessage::Ok(_)) => {
                self.connected.store(true, Ordering::SeqCst);
                self.connect_done.complete(Ok(()));
                debug!(id = %self.id, "connection ready");
                Ok(Phase::Ready)
            }
            (Phase::AwaitingHandshakeResult, ServerMessage::Error(err)) => {
                Ok(self.fail_connect(core, err.into()))
            }
            (Phase::AwaitingHandshakeResult, ServerMessage::AuthSwitchRequest(req)) => {
                debug!(id = %self.id, plugin = %req.plugin_name, "auth switch requested");
                let password = self.opts.password.as_deref().unwrap_or("");
                match handshake::scramble_password(&req.plugin_name, password, &req.plugin_data) {
                    Ok(scramble) => {
                        let mut payload = Vec::new();
                        handshake::write_auth_switch_response(&mut payload, &scramble);
                        self.send_payload(core, sequence_id.wrapping_add(1), &payload);
                        Ok(Phase::AwaitingHandshakeResult)
                    }
                    Err(err) => Ok(self.fail_connect(core, err)),
                }
            }
            (Phase::AwaitingHandshakeResult, ServerMessage::AuthMoreData(data)) => {
                match data.first() {
                    Some(&handshake::FAST_AUTH_SUCCESS) => Ok(Phase::AwaitingHandshakeResult),
                    Some(&handshake::FULL_AUTH_REQUIRED) => Ok(self.fail_connect(
                        core,
                        Error::Unsupported(
                            "caching_sha2_password full authentication requires a secure transport"
                                .to_string(),
                        ),
                    )),
                    _ => {
                        warn!(id = %self.id, "dropping unrecognized auth data");
                        Ok(Phase::AwaitingHandshakeResult)
                    }
                }
            }

            // -- text protocol query -------------------------------------
            (Phase::Querying(QueryPhase::TextResponse), ServerMessage::Ok(ok)) => {
                self.complete_pending(Ok(QueryResult::from_ok(&ok)));
                Ok(Phase::Ready)
            }
            (
                Phase::Querying(QueryPhase::TextResponse),
                ServerMessage::ResultSetHeader { column_count },
            ) => {
                core.accumulator.start(column_count);
                Ok(Phase::Querying(QueryPhase::TextColumns))
            }
            (Phase::Querying(QueryPhase::TextColumns), ServerMessage::ColumnDefinition(col)) => {
                core.accumulator.push_column(col);
                Ok(Phase::Querying(QueryPhase::TextColumns))
            }
            (Phase::Querying(QueryPhase::TextColumns), ServerMessage::Eof(_)) => {
                Ok(Phase::Querying(QueryPhase::TextRows))
            }
            (Phase::Querying(QueryPhase::TextRows), ServerMessage::Row(cells)) => {
                core.accumulator.push_text_row(cells)?;
                Ok(Phase::Querying(QueryPhase::TextRows))
            }
            (Phase::Querying(QueryPhase::TextRows), ServerMessage::Eof(eof)) => {
                let result_set = core.accumulator.finish();
                self.complete_pending(Ok(QueryResult::from_result_set(result_set, &eof)));
                Ok(Phase::Ready)
            }

            // -- prepared statements -------------------------------------
            (
                Phase::Querying(QueryPhase::PrepareResponse { sql, values }),
                ServerMessage::PreparedStatementPrepared(ok),
            ) => self.on_prepare_ok(core, sql, values, ok),
            (
                Phase::Querying(QueryPhase::PrepareDefinitions {
                    mut remaining_defs,
                    mut remaining_eofs,
                    action,
                }),
                msg @ (ServerMessage::ColumnDefinition(_) | ServerMessage::Eof(_)),
            ) => {
                match msg {
                    ServerMessage::ColumnDefinition(_) => {
                        remaining_defs = remaining_defs.saturating_sub(1)
                    }
                    _ => remaining_eofs = remaining_eofs.saturating_sub(1),
                }
                if remaining_defs == 0 && remaining_eofs == 0 {
                    self.finish_prepare_drain(core, action)
                } else {
                    Ok(Phase::Querying(QueryPhase::PrepareDefinitions {
                        remaining_defs,
                        remaining_eofs,
                        action,
                    }))
                }
            }

            // -- binary protocol result ----------------------------------
            (Phase::Querying(QueryPhase::BinaryResponse), ServerMessage::Ok(ok)) => {
                self.complete_pending(Ok(QueryResult::from_ok(&ok)));
                Ok(Phase::Ready)
            }
            (
                Phase::Querying(QueryPhase::BinaryResponse),
                ServerMessage::ResultSetHeader { column_count },
            ) => {
                core.accumulator.start(column_count);
                Ok(Phase::Querying(QueryPhase::BinaryColumns))
            }
            (Phase::Querying(QueryPhase::BinaryColumns), ServerMessage::ColumnDefinition(col)) => {
                core.accumulator.push_column(col);
                Ok(Phase::Querying(QueryPhase::BinaryColumns))
            }
            (Phase::Querying(QueryPhase::BinaryColumns), ServerMessage::Eof(_)) => {
                Ok(Phase::Querying(QueryPhase::BinaryRows))
            }
            (Phase::Querying(QueryPhase::BinaryRows), ServerMessage::BinaryRow(values)) => {
                core.accumulator.push_binary_row(values);
                Ok(Phase::Querying(QueryPhase::BinaryRows))
            }
            (Phase::Querying(QueryPhase::BinaryRows), ServerMessage::Eof(eof)) => {
                let result_set = core.accumulator.finish();
                self.complete_pending(Ok(QueryResult::from_result_set(result_set, &eof)));
                Ok(Phase::Ready)
            }

            // -- server-reported failure of the running query ------------
            // Non-fatal: the query fails, the connection returns to Ready.
            (Phase::Querying(_), ServerMessage::Error(err)) => {
                core.accumulator.clear();
                self.fail_pending(err.into());
                Ok(Phase::Ready)
            }

            // -- everything else is dropped, never fatal -----------------
            (phase, msg) => {
                warn!(id = %self.id, ?msg, "dropping unexpected server message");
                Ok(phase)
            }
        }
    }

    fn on_handshake(
        &self,
        core: &mut Core,
        h: handshake::InitialHandshake,
        sequence_id: u8,
    ) -> Result<Phase> {
        debug!(
            id = %self.id,
            server_version = %h.server_version,
            plugin = %h.auth_plugin_name,
            "received server handshake"
        );

        if !h
            .capability_flags
            .contains(CapabilityFlags::CLIENT_PROTOCOL_41)
        {
            return Ok(self.fail_connect(
                core,
                Error::Unsupported("server does not speak protocol 41".to_string()),
            ));
        }

        let password = self.opts.password.as_deref().unwrap_or("");
        let auth_response =
            match handshake::scramble_password(&h.auth_plugin_name, password, &h.auth_plugin_data)
            {
                Ok(bytes) => bytes,
                Err(err) => return Ok(self.fail_connect(core, err)),
            };

        core.server_version = Some(ServerVersion::parse(&h.server_version));

        let mut capability_flags = CAPABILITIES_ALWAYS_ENABLED;
        if self.opts.db.is_some() {
            capability_flags |= CapabilityFlags::CLIENT_CONNECT_WITH_DB;
        }
        if self.opts.application_name.is_some() {
            capability_flags |= CapabilityFlags::CLIENT_CONNECT_ATTRS;
        }

        let mut payload = Vec::new();
        handshake::write_handshake_response(
            &mut payload,
            &HandshakeResponse41 {
                capability_flags,
                max_packet_size: MAX_PACKET_SIZE,
                charset: self.charset_id,
                username: &self.opts.user,
                auth_response: &auth_response,
                database: self.opts.db.as_deref(),
                auth_plugin_name: Some(&h.auth_plugin_name),
                application_name: self.opts.application_name.as_deref(),
            },
        );
        self.send_payload(core, sequence_id.wrapping_add(1), &payload);

        Ok(Phase::AwaitingHandshakeResult)
    }

    fn on_prepare_ok(
        &self,
        core: &mut Core,
        sql: String,
        values: Vec<Value>,
        ok: PrepareOk,
    ) -> Result<Phase> {
        let remaining_defs = ok.num_params as u32 + ok.num_columns as u32;
        let remaining_eofs = (ok.num_params > 0) as u8 + (ok.num_columns > 0) as u8;

        let action = if ok.num_params as usize == values.len() {
            let statement = CachedStatement {
                statement_id: ok.statement_id,
                num_params: ok.num_params,
            };
            core.statements.insert(sql, statement);
            PrepareAction::Execute { statement, values }
        } else {
            // The server's count is authoritative: the naive `?` count
            // matched, so the extra placeholders sat inside literals.
            PrepareAction::Fail {
                statement_id: ok.statement_id,
                error: Error::InsufficientParameters {
                    expected: ok.num_params as usize,
                    actual: values.len(),
                },
            }
        };

        if remaining_defs == 0 && remaining_eofs == 0 {
            self.finish_prepare_drain(core, action)
        } else {
            Ok(Phase::Querying(QueryPhase::PrepareDefinitions {
                remaining_defs,
                remaining_eofs,
                action,
            }))
        }
    }

    fn finish_prepare_drain(&self, core: &mut Core, action: PrepareAction) -> Result<Phase> {
        match action {
            PrepareAction::Execute { statement, values } => {
                let supports_micros = core
                    .server_version
                    .is_none_or(|v| v.supports_microseconds());
                let mut payload = Vec::new();
                command::write_execute(
                    &mut payload,
                    statement.statement_id,
                    &values,
                    supports_micros,
                );
                self.send_command(core, &payload);
                Ok(Phase::Querying(QueryPhase::BinaryResponse))
            }
            PrepareAction::Fail {
                statement_id,
                error,
            } => {
                let mut payload = Vec::new();
                command::write_close_statement(&mut payload, statement_id);
                self.send_command(core, &payload);
                self.fail_pending(error);
                Ok(Phase::Ready)
            }
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Close the connection: fail the pending query, send COM_QUIT when
    /// authenticated, shut the transport down, and complete the
    /// disconnect future. Safe to call from any path; only the first
    /// arrival at `Closed` has any effect.
    pub fn initiate_close(&self, reason: Option<Error>) {
        let finish_directly;
        {
            let mut core = self.lock_state();
            if matches!(core.phase, Phase::Closed) {
                return;
            }
            debug!(id = %self.id, "closing connection");

            let failure = reason.clone().unwrap_or(Error::ConnectionClosed);
            if let Some(err) = reason.clone() {
                core.last_error = Some(err);
            }
            core.close_outcome = reason;
            core.phase = Phase::Closed;
            core.accumulator.clear();
            core.statements.clear();

            let was_connected = self.connected.swap(false, Ordering::SeqCst);
            self.connect_done.complete(Err(failure.clone()));
            if let Some(inflight) = self.pending.take() {
                inflight.complete(Err(failure));
            }

            finish_directly = match core.writer.take() {
                Some(writer) => {
                    if was_connected {
                        let mut payload = Vec::new();
                        command::write_quit(&mut payload);
                        let _ = writer.send(WriteCmd::Packet(packet::encode_payload(0, &payload)));
                    }
                    // The writer completes teardown after the quit frame
                    // is flushed.
                    writer.send(WriteCmd::Shutdown).is_err()
                }
                None => true,
            };
        }

        if finish_directly {
            self.finish_close();
        }
    }

    /// Final step of a deliberate close, invoked by the writer task once
    /// the write half is flushed and shut down.
    pub fn finish_close(&self) {
        let outcome = {
            let mut core = self.lock_state();
            core.phase = Phase::Closed;
            core.writer = None;
            core.close_outcome.clone()
        };
        let value = match outcome {
            Some(err) => Err(err),
            None => Ok(()),
        };
        self.disconnect_done.complete(value);
        debug!(id = %self.id, "connection closed");
    }

    /// The armed query deadline fired: the pending query times out and
    /// the connection is disconnected.
    pub fn on_query_timeout(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
        warn!(id = %self.id, "query timed out, disconnecting");
        {
            let mut core = self.lock_state();
            core.last_error = Some(Error::TimedOut);
        }
        if let Some(inflight) = self.pending.take() {
            inflight.complete(Err(Error::TimedOut));
        }
        self.initiate_close(None);
    }

    /// A failure before the connection reached `Ready`: fail the connect
    /// future and tear down.
    fn fail_connect(&self, core: &mut Core, err: Error) -> Phase {
        warn!(id = %self.id, error = %err, "connect failed");
        core.last_error = Some(err.clone());
        core.close_outcome = None;
        self.connected.store(false, Ordering::SeqCst);
        self.connect_done.complete(Err(err));

        match core.writer.take() {
            Some(writer) => {
                let _ = writer.send(WriteCmd::Shutdown);
            }
            None => {
                self.disconnect_done.complete(Ok(()));
            }
        }
        Phase::Closed
    }

    // ------------------------------------------------------------------
    // Pending-query helpers
    // ------------------------------------------------------------------

    fn complete_pending(&self, result: Result<QueryResult>) {
        if let Some(inflight) = self.pending.take() {
            inflight.complete(result);
        }
    }

    fn fail_pending(&self, err: Error) {
        self.complete_pending(Err(err));
    }

    // ------------------------------------------------------------------
    // Outgoing frames
    // ------------------------------------------------------------------

    fn send_payload(&self, core: &mut Core, sequence_id: u8, payload: &[u8]) {
        if let Some(writer) = &core.writer {
            // A dead writer surfaces through the transport error path.
            let _ = writer.send(WriteCmd::Packet(packet::encode_payload(
                sequence_id,
                payload,
            )));
        }
    }

    /// Commands start a fresh sequence at zero.
    fn send_command(&self, core: &mut Core, payload: &[u8]) {
        self.send_payload(core, 0, payload);
    }

    // ------------------------------------------------------------------
    // Read-only views
    // ------------------------------------------------------------------

    pub fn server_version(&self) -> Option<ServerVersion> {
        self.lock_state().server_version
    }

    pub fn last_error(&self) -> Option<Error> {
        self.lock_state().last_error.clone()
    }
}

impl Core {
    /// Derive what the next frame must be from the current phase.
    fn decode_context(&self) -> DecodeContext<'_> {
        match &self.phase {
            Phase::AwaitingHandshake => DecodeContext::Handshake,
            Phase::AwaitingHandshakeResult => DecodeContext::HandshakeResult,
            Phase::Querying(query) => match query {
                QueryPhase::TextResponse | QueryPhase::BinaryResponse => {
                    DecodeContext::CommandResponse
                }
                QueryPhase::TextColumns
                | QueryPhase::BinaryColumns
                | QueryPhase::PrepareDefinitions { .. } => DecodeContext::ColumnDefinition,
                QueryPhase::TextRows => DecodeContext::TextRow,
                QueryPhase::BinaryRows => DecodeContext::BinaryRow {
                    columns: self.accumulator.columns(),
                },
                QueryPhase::PrepareResponse { .. } => DecodeContext::PrepareResponse,
            },
            Phase::Disconnected | Phase::Connecting | Phase::Ready | Phase::Closed => {
                DecodeContext::Idle
            }
        }
    }
}

// ----------------------------------------------------------------------
// Query issuance (called from the public API)
// ----------------------------------------------------------------------

/// Install the pending query and send COM_QUERY.
pub(crate) fn begin_text_query(
    inner: &Arc<ConnInner>,
    sql: &str,
) -> Result<oneshot::Receiver<Result<QueryResult>>> {
    let mut core = inner.lock_state();
    check_ready(inner, &core)?;

    let rx = install_pending(inner)?;
    core.accumulator.clear();

    let mut payload = Vec::new();
    command::write_query(&mut payload, sql);
    inner.send_command(&mut core, &payload);
    core.phase = Phase::Querying(QueryPhase::TextResponse);

    Ok(rx)
}

/// Validate placeholders, install the pending query, and either execute
/// a cached statement or start a prepare round-trip.
pub(crate) fn begin_prepared_statement(
    inner: &Arc<ConnInner>,
    sql: &str,
    values: Vec<Value>,
) -> Result<oneshot::Receiver<Result<QueryResult>>> {
    let expected = command::placeholder_count(sql);
    if expected != values.len() {
        return Err(Error::InsufficientParameters {
            expected,
            actual: values.len(),
        });
    }

    let mut core = inner.lock_state();
    check_ready(inner, &core)?;

    if let Some(statement) = core.statements.get(sql).copied() {
        if statement.num_params as usize != values.len() {
            return Err(Error::InsufficientParameters {
                expected: statement.num_params as usize,
                actual: values.len(),
            });
        }

        let rx = install_pending(inner)?;
        core.accumulator.clear();

        let supports_micros = core
            .server_version
            .is_none_or(|v| v.supports_microseconds());
        let mut payload = Vec::new();
        command::write_execute(&mut payload, statement.statement_id, &values, supports_micros);
        inner.send_command(&mut core, &payload);
        core.phase = Phase::Querying(QueryPhase::BinaryResponse);
        return Ok(rx);
    }

    let rx = install_pending(inner)?;
    core.accumulator.clear();

    let mut payload = Vec::new();
    command::write_prepare(&mut payload, sql);
    inner.send_command(&mut core, &payload);
    core.phase = Phase::Querying(QueryPhase::PrepareResponse {
        sql: sql.to_string(),
        values,
    });

    Ok(rx)
}

fn check_ready(inner: &Arc<ConnInner>, core: &Core) -> Result<()> {
    match core.phase {
        Phase::Ready => Ok(()),
        Phase::Querying(_) => Err(Error::StillRunningQuery {
            connection_id: inner.id.clone(),
            race_lost: false,
        }),
        _ => Err(Error::NotConnected),
    }
}

/// The compare-and-set on the single-place register. Losing it is the
/// programmer error of the contract.
fn install_pending(inner: &Arc<ConnInner>) -> Result<oneshot::Receiver<Result<QueryResult>>> {
    let (tx, rx) = oneshot::channel();

    let guard = inner.opts.effective_query_timeout().map(|duration| {
        let weak = Arc::downgrade(inner);
        timeout::arm(duration, move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_query_timeout();
            }
        })
    });

    inner
        .pending
        .install(InFlight::new(tx, guard))
        .map_err(|_| Error::StillRunningQuery {
            connection_id: inner.id.clone(),
            race_lost: true,
        })?;

    Ok(rx)
}
