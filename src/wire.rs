use std::collections::HashMap;
use std::fmt::Debug;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use futures::{Sink, SinkExt, stream};
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::messages::response::{NoticeResponse, NotificationResponse};
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tokio::sync::broadcast::{self, error::TryRecvError};
use ulid::Ulid;

use crate::auth::{AgentcalAuthSource, Caller};
use crate::engine::{Engine, EngineError};
use crate::limits::{MAX_CHANNEL_NAME_LEN, MAX_LISTENS_PER_CONNECTION};
use crate::model::*;
use crate::notify::{Notice, NotifyError, NotifyHub};
use crate::observability::{self, command_label};
use crate::sql::{self, Command, SqlError};

/// Everything a connection needs, shared by all connections.
pub struct ServerContext {
    pub engine: Arc<Engine>,
    pub hub: Arc<NotifyHub>,
    pub password: String,
    pub service_user: String,
}

/// One per connection: owns that connection's LISTEN subscriptions.
pub struct AgentcalHandler {
    ctx: Arc<ServerContext>,
    query_parser: Arc<AgentcalQueryParser>,
    listeners: Mutex<HashMap<String, broadcast::Receiver<Notice>>>,
}

impl AgentcalHandler {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self {
            ctx,
            query_parser: Arc::new(AgentcalQueryParser),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    fn caller<C: ClientInfo>(&self, client: &C) -> Option<Caller> {
        let user = client.metadata().get("user")?;
        Caller::from_login(user, &self.ctx.service_user)
    }

    fn listeners(&self) -> std::sync::MutexGuard<'_, HashMap<String, broadcast::Receiver<Notice>>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queued notices for this connection's channels, oldest first.
    fn drain_notifications(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut listeners = self.listeners();
        listeners.retain(|channel, rx| loop {
            match rx.try_recv() {
                Ok(notice) => match notice.payload() {
                    Ok(payload) => out.push((channel.clone(), payload)),
                    Err(e) => tracing::warn!("dropping notice on {channel}: {e}"),
                },
                Err(TryRecvError::Empty) => break true,
                Err(TryRecvError::Lagged(n)) => {
                    tracing::warn!("listener on {channel} lagged, {n} notices lost");
                    metrics::counter!(observability::NOTIFICATIONS_DROPPED_TOTAL).increment(n);
                }
                // The hub closed an idle channel.
                Err(TryRecvError::Closed) => break false,
            }
        });
        out
    }

    async fn flush_notifications<C>(&self, client: &mut C) -> PgWireResult<()>
    where
        C: ClientInfo + Sink<PgWireBackendMessage> + Unpin + Send,
        PgWireError: From<C::Error>,
    {
        let pending = self.drain_notifications();
        if pending.is_empty() {
            return Ok(());
        }
        let (pid, _) = client.pid_and_secret_key();
        for (channel, payload) in pending {
            client
                .feed(PgWireBackendMessage::NotificationResponse(NotificationResponse::new(
                    pid, channel, payload,
                )))
                .await?;
        }
        client.flush().await?;
        Ok(())
    }

    async fn send_notices<C>(&self, client: &mut C, notices: Vec<String>) -> PgWireResult<()>
    where
        C: Sink<PgWireBackendMessage> + Unpin + Send,
        PgWireError: From<C::Error>,
    {
        for message in notices {
            let info = ErrorInfo::new("NOTICE".into(), "00000".into(), message);
            client
                .send(PgWireBackendMessage::NoticeResponse(NoticeResponse::from(info)))
                .await?;
        }
        Ok(())
    }

    /// Parse, authorize, execute, record metrics. Informational messages
    /// for the client are pushed onto `notices`.
    async fn run_statement(
        &self,
        caller: Option<Caller>,
        sql_text: &str,
        format: &Format,
        notices: &mut Vec<String>,
    ) -> PgWireResult<Response> {
        let cmd = match sql::parse_sql(sql_text) {
            Ok(cmd) => cmd,
            Err(SqlError::Empty) => return Ok(Response::EmptyQuery),
            Err(e) => {
                metrics::counter!(observability::QUERIES_TOTAL, "command" => "parse", "status" => "error")
                    .increment(1);
                return Err(sql_err(e));
            }
        };
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(caller, cmd, format, notices).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        caller: Option<Caller>,
        cmd: Command,
        format: &Format,
        notices: &mut Vec<String>,
    ) -> PgWireResult<Response> {
        let engine = &self.ctx.engine;
        if cmd.is_mutation() && caller.is_none() {
            return Err(denied("login has no agentcal role; read-only"));
        }

        match cmd {
            Command::InsertAgent { id, name, default_duration } => {
                let caller = require(caller)?;
                if !(caller.is_admin() || caller.is_agent(id)) {
                    return Err(denied("agents can only register themselves"));
                }
                engine
                    .create_agent(id, name, default_duration.unwrap_or_default())
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_oid(0).with_rows(1)))
            }
            Command::UpdateAgent { id, patch } => {
                authorize_agent(caller, id)?;
                engine.update_agent(id, patch).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteAgent { id } => {
                authorize_agent(caller, id)?;
                engine.delete_agent(id).await.map_err(engine_err)?;
                self.ctx.hub.remove(&id);
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectAgents { id } => {
                let agents = match id {
                    Some(id) => vec![engine.get_agent_info(id).await.map_err(engine_err)?],
                    None => engine.list_agents().await,
                };
                let schema = Arc::new(agents_schema(format));
                let rows: Vec<PgWireResult<_>> = agents
                    .into_iter()
                    .map(|a| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&a.id.to_string())?;
                        encoder.encode_field(&a.name)?;
                        encoder.encode_field(&a.accepting_bookings)?;
                        encoder.encode_field(&i32::from(a.default_duration.minutes()))?;
                        encoder.encode_field(&(a.booking_count as i64))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectSlots { agent_id, date, duration } => {
                let day = engine
                    .day_slots(agent_id, date, duration)
                    .await
                    .map_err(engine_err)?;
                if let Some(message) = day.message {
                    notices.push(message);
                }
                let schema = Arc::new(slots_schema(format));
                let rows: Vec<PgWireResult<_>> = day
                    .slots
                    .iter()
                    .map(|slot| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&slot.label())?;
                        encoder.encode_field(&slot.available)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectWeeklyHours { agent_id } => {
                let week = engine
                    .weekly_availability(agent_id)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(weekly_schema(format));
                let rows: Vec<PgWireResult<_>> = week
                    .iter()
                    .map(|day| {
                        let slots: Vec<String> = day.slots.iter().map(Span::to_string).collect();
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&i32::from(day.day))?;
                        encoder.encode_field(&day.unavailable)?;
                        encoder.encode_field(&slots.join(","))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::ReplaceWeeklyHours { agent_id, entries } => {
                authorize_agent(caller, agent_id)?;
                let count = entries.len();
                engine
                    .save_weekly_availability(agent_id, entries)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_oid(0).with_rows(count)))
            }
            Command::ClearWeeklyHours { agent_id } => {
                authorize_agent(caller, agent_id)?;
                engine
                    .save_weekly_availability(agent_id, Vec::new())
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(0)))
            }
            Command::InsertBooking(req) => {
                let caller = require(caller)?;
                if !caller.can_book(req.agent_id, req.client_id) {
                    return Err(denied("clients book only for themselves"));
                }
                engine.propose_booking(req).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_oid(0).with_rows(1)))
            }
            Command::UpdateBookingStatus { id, status } => {
                engine
                    .update_booking_status(require(caller)?, id, status)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::MarkBookingSeen { id } => {
                engine
                    .mark_booking_seen(require(caller)?, id)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteBooking { id } => {
                engine
                    .delete_booking(require(caller)?, id)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectBookings { id, agent_id, date } => {
                let bookings = match (id, agent_id) {
                    (Some(id), _) => {
                        let b = engine.get_booking(id).await.map_err(engine_err)?;
                        if agent_id.is_some_and(|a| a != b.agent_id) {
                            Vec::new()
                        } else {
                            vec![b]
                        }
                    }
                    (None, Some(agent_id)) => {
                        engine.get_bookings(agent_id, date).await.map_err(engine_err)?
                    }
                    (None, None) => return Err(sql_err(SqlError::MissingFilter("agent_id"))),
                };
                let schema = Arc::new(bookings_schema(format));
                let rows: Vec<PgWireResult<_>> = bookings
                    .iter()
                    .filter(|b| date.is_none_or(|d| b.date == d))
                    .map(|b| encode_booking(&schema, b))
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::Listen { channel } => {
                self.listen(caller, channel)?;
                Ok(Response::Execution(Tag::new("LISTEN")))
            }
            Command::Unlisten { channel } => {
                let mut listeners = self.listeners();
                match channel {
                    Some(channel) => {
                        listeners.remove(&channel);
                    }
                    None => listeners.clear(),
                }
                Ok(Response::Execution(Tag::new("UNLISTEN")))
            }
        }
    }

    fn listen(&self, caller: Option<Caller>, channel: String) -> PgWireResult<()> {
        if channel.len() > MAX_CHANNEL_NAME_LEN {
            return Err(user_error("22023", "channel name too long".into()));
        }
        let agent_id = channel
            .strip_prefix("agent_")
            .and_then(|id| Ulid::from_string(id).ok())
            .ok_or_else(|| {
                user_error(
                    "22023",
                    format!("invalid channel: {channel} (expected agent_{{ulid}})"),
                )
            })?;
        if !caller.is_some_and(|c| c.can_manage_agent(agent_id)) {
            return Err(denied("only the agent or an admin may listen on its channel"));
        }
        if !self.ctx.engine.store.contains_agent(&agent_id) {
            return Err(engine_err(EngineError::NotFound(agent_id)));
        }
        if self.listeners().contains_key(&channel) {
            return Ok(());
        }
        if self.listeners().len() >= MAX_LISTENS_PER_CONNECTION {
            return Err(engine_err(EngineError::LimitExceeded("too many LISTENs on this connection")));
        }
        let rx = self.ctx.hub.subscribe(agent_id).map_err(notify_err)?;
        self.listeners().insert(channel, rx);
        Ok(())
    }
}

fn require(caller: Option<Caller>) -> PgWireResult<Caller> {
    caller.ok_or_else(|| denied("login has no agentcal role; read-only"))
}

fn authorize_agent(caller: Option<Caller>, agent_id: Ulid) -> PgWireResult<()> {
    if require(caller)?.can_manage_agent(agent_id) {
        Ok(())
    } else {
        Err(denied("only the agent or an admin may change this agent"))
    }
}

fn encode_booking(
    schema: &Arc<Vec<FieldInfo>>,
    b: &Booking,
) -> PgWireResult<pgwire::messages::data::DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&b.id.to_string())?;
    encoder.encode_field(&b.agent_id.to_string())?;
    encoder.encode_field(&b.client_id.to_string())?;
    encoder.encode_field(&b.service_id.map(|s| s.to_string()))?;
    encoder.encode_field(&b.date.to_string())?;
    encoder.encode_field(&format_hhmm(b.span.start))?;
    encoder.encode_field(&format_hhmm(b.span.end))?;
    encoder.encode_field(&b.status.to_string())?;
    encoder.encode_field(&b.total_amount)?;
    encoder.encode_field(&b.commission)?;
    encoder.encode_field(&b.seen_by_agent)?;
    encoder.encode_field(&b.notes)?;
    Ok(encoder.take_row())
}

// ── Result schemas ───────────────────────────────────────────────

fn fields(format: &Format, columns: &[(&str, Type)]) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            FieldInfo::new((*name).into(), None, None, ty.clone(), format.format_for(i))
        })
        .collect()
}

fn slots_schema(format: &Format) -> Vec<FieldInfo> {
    fields(format, &[("time", Type::VARCHAR), ("available", Type::BOOL)])
}

fn weekly_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        format,
        &[("day", Type::INT4), ("unavailable", Type::BOOL), ("slots", Type::VARCHAR)],
    )
}

fn agents_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        format,
        &[
            ("id", Type::VARCHAR),
            ("name", Type::VARCHAR),
            ("accepting_bookings", Type::BOOL),
            ("default_duration", Type::INT4),
            ("booking_count", Type::INT8),
        ],
    )
}

fn bookings_schema(format: &Format) -> Vec<FieldInfo> {
    fields(
        format,
        &[
            ("id", Type::VARCHAR),
            ("agent_id", Type::VARCHAR),
            ("client_id", Type::VARCHAR),
            ("service_id", Type::VARCHAR),
            ("date", Type::VARCHAR),
            ("start_time", Type::VARCHAR),
            ("end_time", Type::VARCHAR),
            ("status", Type::VARCHAR),
            ("total_amount", Type::INT8),
            ("commission", Type::INT8),
            ("seen_by_agent", Type::BOOL),
            ("notes", Type::VARCHAR),
        ],
    )
}

/// Row shape of a statement, judged from its `FROM` table. Non-SELECTs have none.
fn result_schema(sql_text: &str, format: &Format) -> Vec<FieldInfo> {
    let lower = sql_text.to_lowercase();
    if !lower.trim_start().starts_with("select") {
        return Vec::new();
    }
    let table = lower
        .split_whitespace()
        .skip_while(|w| *w != "from")
        .nth(1)
        .map(|t| t.trim_end_matches(';'));
    match table {
        Some("slots") => slots_schema(format),
        Some("weekly_hours") => weekly_schema(format),
        Some("agents") => agents_schema(format),
        Some("bookings") => bookings_schema(format),
        _ => Vec::new(),
    }
}

#[async_trait]
impl SimpleQueryHandler for AgentcalHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.flush_notifications(client).await?;
        let caller = self.caller(client);
        let mut notices = Vec::new();
        let response = self
            .run_statement(caller, query, &Format::UnifiedText, &mut notices)
            .await;
        self.send_notices(client, notices).await?;
        Ok(vec![response?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct AgentcalQueryParser;

#[async_trait]
impl QueryParser for AgentcalQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt, column_format.unwrap_or(&Format::UnifiedText)))
    }
}

#[async_trait]
impl ExtendedQueryHandler for AgentcalHandler {
    type Statement = String;
    type QueryParser = AgentcalQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        self.flush_notifications(client).await?;
        let caller = self.caller(client);
        let sql_text = substitute_params(portal);
        let mut notices = Vec::new();
        let response = self
            .run_statement(caller, &sql_text, &portal.result_column_format, &mut notices)
            .await;
        self.send_notices(client, notices).await?;
        response
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement, &Format::UnifiedText),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
            {
                max = max.max(n);
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute `$1`, `$2`, ... with bound parameter values as quoted literals.
/// Highest index first so `$1` never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut result = portal.statement.statement.to_string();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct AgentcalFactory {
    handler: Arc<AgentcalHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<AgentcalAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl AgentcalFactory {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        let auth_source = AgentcalAuthSource::new(ctx.password.clone());
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(AgentcalHandler::new(ctx)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for AgentcalFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client socket until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    ctx: Arc<ServerContext>,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(AgentcalFactory::new(ctx));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".into(), code.into(), message)))
}

fn denied(message: &str) -> PgWireError {
    user_error("42501", message.into())
}

pub fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Validation(_) | EngineError::InvalidTransition { .. } => "22023",
        EngineError::NotFound(_) => "P0002",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::NotAvailable(_) => "55000",
        EngineError::Conflict(_) => "23P01",
        EngineError::Unauthorized(_) => "42501",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::WalError(_) => "XX000",
    }
}

/// Client-facing message; internal details only go to the log.
fn client_message(e: &EngineError) -> String {
    match e {
        EngineError::WalError(detail) => {
            tracing::error!("internal error: {detail}");
            "internal error".to_string()
        }
        other => other.to_string(),
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(sqlstate(&e), client_message(&e))
}

fn sql_err(e: SqlError) -> PgWireError {
    let code = match e {
        SqlError::Invalid(_) => "22023",
        _ => "42601",
    };
    user_error(code, e.to_string())
}

fn notify_err(e: NotifyError) -> PgWireError {
    let code = match e {
        NotifyError::TooManySubscriptions(_) => "54000",
        NotifyError::Encode(_) | NotifyError::Unavailable(_) => "XX000",
    };
    user_error(code, e.to_string())
}
