use std::collections::HashMap;

use chrono::NaiveDate;
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor,
    TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertAgent {
        id: Ulid,
        name: Option<String>,
        default_duration: Option<MeetingDuration>,
    },
    UpdateAgent {
        id: Ulid,
        patch: AgentPatch,
    },
    DeleteAgent {
        id: Ulid,
    },
    SelectAgents {
        id: Option<Ulid>,
    },
    SelectSlots {
        agent_id: Ulid,
        date: NaiveDate,
        duration: Option<Minute>,
    },
    SelectWeeklyHours {
        agent_id: Ulid,
    },
    /// Every row of one INSERT becomes the agent's whole schedule.
    ReplaceWeeklyHours {
        agent_id: Ulid,
        entries: Vec<WeeklyEntry>,
    },
    ClearWeeklyHours {
        agent_id: Ulid,
    },
    InsertBooking(BookingRequest),
    UpdateBookingStatus {
        id: Ulid,
        status: BookingStatus,
    },
    MarkBookingSeen {
        id: Ulid,
    },
    DeleteBooking {
        id: Ulid,
    },
    SelectBookings {
        id: Option<Ulid>,
        agent_id: Option<Ulid>,
        date: Option<NaiveDate>,
    },
    Listen {
        channel: String,
    },
    /// `None` means `UNLISTEN *`.
    Unlisten {
        channel: Option<String>,
    },
}

impl Command {
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Command::SelectAgents { .. }
                | Command::SelectSlots { .. }
                | Command::SelectWeeklyHours { .. }
                | Command::SelectBookings { .. }
                | Command::Listen { .. }
                | Command::Unlisten { .. }
        )
    }
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if let Some(rest) = strip_keyword(trimmed, "LISTEN") {
        return Ok(Command::Listen { channel: channel_name(rest)? });
    }
    if let Some(rest) = strip_keyword(trimmed, "UNLISTEN") {
        let channel = match rest.trim() {
            "*" => None,
            other => Some(channel_name(other)?),
        };
        return Ok(Command::Unlisten { channel });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let stmt = match stmts.as_slice() {
        [] => return Err(SqlError::Empty),
        [one] => one,
        _ => return Err(SqlError::Unsupported("multiple statements".into())),
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update { table, assignments, selection, .. } => {
            parse_update(&table.relation, assignments, selection)
        }
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn strip_keyword<'a>(sql: &'a str, keyword: &str) -> Option<&'a str> {
    let head = sql.get(..keyword.len())?;
    let rest = &sql[keyword.len()..];
    (head.eq_ignore_ascii_case(keyword) && rest.starts_with(char::is_whitespace)).then_some(rest)
}

fn channel_name(raw: &str) -> Result<String, SqlError> {
    let name = raw.trim().trim_matches('"');
    if name.is_empty() {
        return Err(SqlError::Parse("missing channel name".into()));
    }
    Ok(name.to_string())
}

// ── INSERT ────────────────────────────────────────────────────

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let rows = extract_all_insert_rows(insert)?;

    match table.as_str() {
        "agents" => {
            let [row] = rows.as_slice() else {
                return Err(SqlError::Unsupported("multi-row INSERT INTO agents".into()));
            };
            let cols = named_row(insert, row, &["id", "name", "default_duration"])?;
            Ok(Command::InsertAgent {
                id: parse_ulid(required(&cols, "id")?)?,
                name: optional(&cols, "name").map(parse_string_or_null).transpose()?.flatten(),
                default_duration: optional(&cols, "default_duration")
                    .map(parse_duration_or_null)
                    .transpose()?
                    .flatten(),
            })
        }
        "weekly_hours" => {
            const COLUMNS: &[&str] = &["agent_id", "day", "start_time", "end_time", "active"];
            let mut agent_id = None;
            let mut entries = Vec::with_capacity(rows.len());
            for (i, row) in rows.iter().enumerate() {
                let at_row = |e: SqlError| SqlError::Parse(format!("row {i}: {e}"));
                let cols = named_row(insert, row, COLUMNS)?;
                let row_agent = parse_ulid(required(&cols, "agent_id")?).map_err(at_row)?;
                if *agent_id.get_or_insert(row_agent) != row_agent {
                    return Err(SqlError::Unsupported(
                        "weekly_hours rows for more than one agent".into(),
                    ));
                }
                let day = parse_i64(required(&cols, "day")?).map_err(at_row)?;
                if !(0..=6).contains(&day) {
                    return Err(ModelError::BadDay(day).into());
                }
                let span = Span::parse(
                    &parse_string(required(&cols, "start_time")?).map_err(at_row)?,
                    &parse_string(required(&cols, "end_time")?).map_err(at_row)?,
                )?;
                let active = match optional(&cols, "active") {
                    Some(expr) => parse_bool(expr).map_err(at_row)?,
                    None => true,
                };
                entries.push(WeeklyEntry { day: day as u8, span, active });
            }
            Ok(Command::ReplaceWeeklyHours {
                agent_id: agent_id.ok_or_else(|| SqlError::Parse("empty VALUES".into()))?,
                entries,
            })
        }
        "bookings" => {
            let [row] = rows.as_slice() else {
                return Err(SqlError::Unsupported("multi-row INSERT INTO bookings".into()));
            };
            let cols = named_row(
                insert,
                row,
                &[
                    "id", "agent_id", "client_id", "date", "start_time", "end_time", "service_id",
                    "total_amount", "notes",
                ],
            )?;
            let span = Span::parse(
                &parse_string(required(&cols, "start_time")?)?,
                &parse_string(required(&cols, "end_time")?)?,
            )?;
            Ok(Command::InsertBooking(BookingRequest {
                id: parse_ulid(required(&cols, "id")?)?,
                agent_id: parse_ulid(required(&cols, "agent_id")?)?,
                client_id: parse_ulid(required(&cols, "client_id")?)?,
                service_id: optional(&cols, "service_id")
                    .map(parse_ulid_or_null)
                    .transpose()?
                    .flatten(),
                date: parse_date_expr(required(&cols, "date")?)?,
                span,
                total_amount: optional(&cols, "total_amount")
                    .map(parse_i64_or_null)
                    .transpose()?
                    .flatten(),
                notes: optional(&cols, "notes").map(parse_string_or_null).transpose()?.flatten(),
            }))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Pair a VALUES row with its column names. Without a column list the
/// table's `default_order` applies.
fn named_row<'a>(
    insert: &ast::Insert,
    row: &'a [Expr],
    default_order: &[&str],
) -> Result<HashMap<String, &'a Expr>, SqlError> {
    let names: Vec<String> = if insert.columns.is_empty() {
        default_order.iter().map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if row.len() != names.len() && !(insert.columns.is_empty() && row.len() < names.len()) {
        return Err(SqlError::WrongArity("VALUES row", names.len(), row.len()));
    }
    let mut cols = HashMap::with_capacity(row.len());
    for (name, expr) in names.into_iter().zip(row) {
        if !default_order.contains(&name.as_str()) {
            return Err(SqlError::UnknownColumn(name));
        }
        cols.insert(name, expr);
    }
    Ok(cols)
}

fn required<'a>(cols: &HashMap<String, &'a Expr>, name: &'static str) -> Result<&'a Expr, SqlError> {
    cols.get(name).copied().ok_or(SqlError::MissingColumn(name))
}

fn optional<'a>(cols: &HashMap<String, &'a Expr>, name: &str) -> Option<&'a Expr> {
    cols.get(name).copied()
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let id = extract_where_id(selection)?;

    let mut sets = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let AssignmentTarget::ColumnName(name) = &assignment.target else {
            return Err(SqlError::Unsupported("tuple assignment".into()));
        };
        let column = object_name_last(name).ok_or_else(|| SqlError::Parse("empty column".into()))?;
        sets.push((column, &assignment.value));
    }

    match table.as_str() {
        "agents" => {
            let mut patch = AgentPatch::default();
            for (column, value) in sets {
                match column.as_str() {
                    "name" => patch.name = parse_string_or_null(value)?,
                    "accepting_bookings" => patch.accepting_bookings = Some(parse_bool(value)?),
                    "default_duration" => {
                        patch.default_duration = Some(MeetingDuration::try_from(parse_i64(value)?)?)
                    }
                    _ => return Err(SqlError::UnknownColumn(column.clone())),
                }
            }
            Ok(Command::UpdateAgent { id, patch })
        }
        "bookings" => match sets.as_slice() {
            [(column, value)] if column == "status" => {
                let status = parse_string(value)?.parse::<BookingStatus>()?;
                Ok(Command::UpdateBookingStatus { id, status })
            }
            [(column, value)] if column == "seen_by_agent" => {
                if !parse_bool(value)? {
                    return Err(SqlError::Unsupported("seen_by_agent can only be set to true".into()));
                }
                Ok(Command::MarkBookingSeen { id })
            }
            [(column, _)] => Err(SqlError::UnknownColumn(column.clone())),
            _ => Err(SqlError::Unsupported(
                "bookings are updated one column at a time (status or seen_by_agent)".into(),
            )),
        },
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    match table.as_str() {
        "agents" => Ok(Command::DeleteAgent { id: extract_where_id(&delete.selection)? }),
        "bookings" => Ok(Command::DeleteBooking { id: extract_where_id(&delete.selection)? }),
        "weekly_hours" => {
            let filters = where_filters(&delete.selection)?;
            let agent_id = parse_ulid(filter(&filters, "agent_id")?)?;
            Ok(Command::ClearWeeklyHours { agent_id })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = where_filters(&select.selection)?;

    match table.as_str() {
        "agents" => Ok(Command::SelectAgents {
            id: filters.get("id").map(|e| parse_ulid(e)).transpose()?,
        }),
        "slots" => Ok(Command::SelectSlots {
            agent_id: parse_ulid(filter(&filters, "agent_id")?)?,
            date: parse_date_expr(filter(&filters, "date")?)?,
            duration: filters.get("duration").map(|e| parse_u16(e)).transpose()?,
        }),
        "weekly_hours" => Ok(Command::SelectWeeklyHours {
            agent_id: parse_ulid(filter(&filters, "agent_id")?)?,
        }),
        "bookings" => {
            let cmd = Command::SelectBookings {
                id: filters.get("id").map(|e| parse_ulid(e)).transpose()?,
                agent_id: filters.get("agent_id").map(|e| parse_ulid(e)).transpose()?,
                date: filters.get("date").map(|e| parse_date_expr(e)).transpose()?,
            };
            if let Command::SelectBookings { id: None, agent_id: None, .. } = cmd {
                return Err(SqlError::MissingFilter("agent_id"));
            }
            Ok(cmd)
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Collect `col = value` pairs from a WHERE clause made only of ANDs.
fn collect_eq_filters<'a>(
    expr: &'a Expr,
    out: &mut HashMap<String, &'a Expr>,
) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        Expr::BinaryOp { left, op: ast::BinaryOperator::And, right } => {
            collect_eq_filters(left, out)?;
            collect_eq_filters(right, out)
        }
        Expr::BinaryOp { left, op: ast::BinaryOperator::Eq, right } => {
            let column = expr_column_name(left)
                .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
            out.insert(column, right.as_ref());
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!(
            "only AND-ed equality filters are supported, got {other}"
        ))),
    }
}

fn where_filters(selection: &Option<Expr>) -> Result<HashMap<String, &Expr>, SqlError> {
    let mut filters = HashMap::new();
    if let Some(expr) = selection {
        collect_eq_filters(expr, &mut filters)?;
    }
    Ok(filters)
}

fn filter<'a>(filters: &HashMap<String, &'a Expr>, col: &'static str) -> Result<&'a Expr, SqlError> {
    filters.get(col).copied().ok_or(SqlError::MissingFilter(col))
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => {
            Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID {s:?}: {e}")))
        }
        Some(value) => Err(SqlError::Parse(format!("expected ULID string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn parse_ulid_or_null(expr: &Expr) -> Result<Option<Ulid>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_ulid(expr).map(Some)
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_string(expr).map(Some)
}

fn parse_date_expr(expr: &Expr) -> Result<NaiveDate, SqlError> {
    Ok(parse_date(&parse_string(expr)?)?)
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            // Extended-protocol parameters arrive quoted.
            Value::Number(s, _) | Value::SingleQuotedString(s) => s
                .trim()
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer {s:?}: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_i64_or_null(expr: &Expr) -> Result<Option<i64>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_i64(expr).map(Some)
}

fn parse_u16(expr: &Expr) -> Result<u16, SqlError> {
    let v = parse_i64(expr)?;
    u16::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of range")))
}

fn parse_duration_or_null(expr: &Expr) -> Result<Option<MeetingDuration>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    Ok(Some(MeetingDuration::try_from(parse_i64(expr)?)?))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
    /// Well-formed SQL carrying a value the domain rejects.
    Invalid(ModelError),
}

impl From<ModelError> for SqlError {
    fn from(e: ModelError) -> Self {
        SqlError::Invalid(e)
    }
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::Invalid(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const B: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn ulid(s: &str) -> Ulid {
        Ulid::from_string(s).unwrap()
    }

    #[test]
    fn parse_insert_agent() {
        let sql = format!("INSERT INTO agents (id, name, default_duration) VALUES ('{A}', 'Ana', 45)");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertAgent {
                id: ulid(A),
                name: Some("Ana".into()),
                default_duration: Some(MeetingDuration::FortyFive),
            }
        );
    }

    #[test]
    fn parse_insert_agent_id_only() {
        let sql = format!("INSERT INTO agents (id) VALUES ('{A}')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertAgent { id: ulid(A), name: None, default_duration: None }
        );
    }

    #[test]
    fn insert_agent_rejects_odd_duration() {
        let sql = format!("INSERT INTO agents (id, default_duration) VALUES ('{A}', 20)");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Invalid(ModelError::BadDuration(20)))));
    }

    #[test]
    fn parse_update_agent() {
        let sql = format!(
            "UPDATE agents SET accepting_bookings = false, default_duration = 60 WHERE id = '{A}'"
        );
        match parse_sql(&sql).unwrap() {
            Command::UpdateAgent { id, patch } => {
                assert_eq!(id, ulid(A));
                assert_eq!(patch.accepting_bookings, Some(false));
                assert_eq!(patch.default_duration, Some(MeetingDuration::Sixty));
                assert_eq!(patch.name, None);
            }
            other => panic!("expected UpdateAgent, got {other:?}"),
        }
    }

    #[test]
    fn parse_slots_query() {
        let sql = format!("SELECT * FROM slots WHERE agent_id = '{A}' AND date = '2026-10-19'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectSlots {
                agent_id: ulid(A),
                date: parse_date("2026-10-19").unwrap(),
                duration: None,
            }
        );

        let sql = format!(
            "SELECT * FROM slots WHERE date = '2026-10-19' AND agent_id = '{A}' AND duration = 15;"
        );
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::SelectSlots { duration: Some(15), .. }
        ));
    }

    #[test]
    fn slots_query_needs_agent_and_date() {
        let sql = format!("SELECT * FROM slots WHERE agent_id = '{A}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingFilter("date"))));
        let sql = "SELECT * FROM slots WHERE date = '2026-10-19'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("agent_id"))));
    }

    #[test]
    fn slots_query_rejects_bad_date() {
        let sql = format!("SELECT * FROM slots WHERE agent_id = '{A}' AND date = '2026-02-30'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Invalid(ModelError::BadDate(_)))));
    }

    #[test]
    fn or_filters_unsupported() {
        let sql = format!("SELECT * FROM bookings WHERE agent_id = '{A}' OR agent_id = '{B}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_weekly_insert_multi_row() {
        let sql = format!(
            "INSERT INTO weekly_hours (agent_id, day, start_time, end_time, active) VALUES \
             ('{A}', 1, '09:00', '12:00', true), ('{A}', 1, '13:00', '17:00', true), \
             ('{A}', 5, '10:00', '14:00', false)"
        );
        match parse_sql(&sql).unwrap() {
            Command::ReplaceWeeklyHours { agent_id, entries } => {
                assert_eq!(agent_id, ulid(A));
                assert_eq!(entries.len(), 3);
                assert_eq!(entries[1].span, Span::new(780, 1020));
                assert!(!entries[2].active);
            }
            other => panic!("expected ReplaceWeeklyHours, got {other:?}"),
        }
    }

    #[test]
    fn weekly_insert_defaults_active_and_checks_rows() {
        let sql = format!(
            "INSERT INTO weekly_hours (agent_id, day, start_time, end_time) VALUES ('{A}', 0, '09:00', '24:00')"
        );
        match parse_sql(&sql).unwrap() {
            Command::ReplaceWeeklyHours { entries, .. } => {
                assert!(entries[0].active);
                assert_eq!(entries[0].span.end, MINUTES_PER_DAY);
            }
            other => panic!("expected ReplaceWeeklyHours, got {other:?}"),
        }

        let mixed = format!(
            "INSERT INTO weekly_hours (agent_id, day, start_time, end_time) VALUES \
             ('{A}', 1, '09:00', '12:00'), ('{B}', 1, '09:00', '12:00')"
        );
        assert!(matches!(parse_sql(&mixed), Err(SqlError::Unsupported(_))));

        let bad_day = format!(
            "INSERT INTO weekly_hours (agent_id, day, start_time, end_time) VALUES ('{A}', 7, '09:00', '12:00')"
        );
        assert!(matches!(parse_sql(&bad_day), Err(SqlError::Invalid(ModelError::BadDay(7)))));

        let inverted = format!(
            "INSERT INTO weekly_hours (agent_id, day, start_time, end_time) VALUES ('{A}', 1, '12:00', '09:00')"
        );
        assert!(matches!(parse_sql(&inverted), Err(SqlError::Invalid(ModelError::EmptySpan { .. }))));

        let sloppy = format!(
            "INSERT INTO weekly_hours (agent_id, day, start_time, end_time) VALUES ('{A}', 1, '9:00', '12:00')"
        );
        assert!(matches!(parse_sql(&sloppy), Err(SqlError::Invalid(ModelError::BadTime(_)))));
    }

    #[test]
    fn parse_clear_weekly() {
        let sql = format!("DELETE FROM weekly_hours WHERE agent_id = '{A}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::ClearWeeklyHours { agent_id: ulid(A) });
    }

    #[test]
    fn parse_insert_booking_any_column_order() {
        let sql = format!(
            "INSERT INTO bookings (agent_id, id, date, start_time, end_time, client_id, total_amount, notes) \
             VALUES ('{A}', '{B}', '2026-10-19', '10:00', '11:00', '{A}', 15000, 'intro call')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking(req) => {
                assert_eq!(req.id, ulid(B));
                assert_eq!(req.agent_id, ulid(A));
                assert_eq!(req.span, Span::new(600, 660));
                assert_eq!(req.total_amount, Some(15_000));
                assert_eq!(req.notes.as_deref(), Some("intro call"));
                assert_eq!(req.service_id, None);
            }
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn insert_booking_with_nulls_and_params_as_strings() {
        let sql = format!(
            "INSERT INTO bookings (id, agent_id, client_id, date, start_time, end_time, service_id, total_amount, notes) \
             VALUES ('{B}', '{A}', '{A}', '2026-10-19', '10:00', '10:30', NULL, '2500', NULL)"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertBooking(req) => {
                assert_eq!(req.total_amount, Some(2_500));
                assert_eq!(req.notes, None);
            }
            other => panic!("expected InsertBooking, got {other:?}"),
        }
    }

    #[test]
    fn insert_booking_missing_column() {
        let sql = format!(
            "INSERT INTO bookings (id, agent_id, date, start_time, end_time) \
             VALUES ('{B}', '{A}', '2026-10-19', '10:00', '10:30')"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingColumn("client_id"))));
    }

    #[test]
    fn insert_unknown_column_rejected() {
        let sql = format!("INSERT INTO agents (id, colour) VALUES ('{A}', 'blue')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownColumn(c)) if c == "colour"));
    }

    #[test]
    fn parse_booking_updates() {
        let sql = format!("UPDATE bookings SET status = 'no_show' WHERE id = '{A}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateBookingStatus { id: ulid(A), status: BookingStatus::NoShow }
        );

        let sql = format!("UPDATE bookings SET seen_by_agent = true WHERE id = '{A}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::MarkBookingSeen { id: ulid(A) });

        let sql = format!("UPDATE bookings SET status = 'DONE' WHERE id = '{A}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Invalid(ModelError::BadStatus(_)))));

        let sql = format!("UPDATE bookings SET status = 'CONFIRMED', seen_by_agent = true WHERE id = '{A}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn update_needs_id_filter() {
        let sql = "UPDATE bookings SET status = 'CONFIRMED'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_deletes() {
        assert_eq!(
            parse_sql(&format!("DELETE FROM bookings WHERE id = '{A}'")).unwrap(),
            Command::DeleteBooking { id: ulid(A) }
        );
        assert_eq!(
            parse_sql(&format!("DELETE FROM agents WHERE id = '{A}'")).unwrap(),
            Command::DeleteAgent { id: ulid(A) }
        );
    }

    #[test]
    fn parse_booking_selects() {
        let sql = format!("SELECT * FROM bookings WHERE agent_id = '{A}' AND date = '2026-10-19'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectBookings {
                id: None,
                agent_id: Some(ulid(A)),
                date: Some(parse_date("2026-10-19").unwrap()),
            }
        );
        assert!(matches!(
            parse_sql("SELECT * FROM bookings"),
            Err(SqlError::MissingFilter("agent_id"))
        ));
    }

    #[test]
    fn parse_agents_and_weekly_selects() {
        assert_eq!(parse_sql("SELECT * FROM agents").unwrap(), Command::SelectAgents { id: None });
        assert_eq!(
            parse_sql(&format!("SELECT * FROM weekly_hours WHERE agent_id = '{A}'")).unwrap(),
            Command::SelectWeeklyHours { agent_id: ulid(A) }
        );
    }

    #[test]
    fn parse_listen_and_unlisten() {
        assert_eq!(
            parse_sql(&format!("LISTEN agent_{A};")).unwrap(),
            Command::Listen { channel: format!("agent_{A}") }
        );
        assert_eq!(
            parse_sql(&format!("unlisten \"agent_{A}\"")).unwrap(),
            Command::Unlisten { channel: Some(format!("agent_{A}")) }
        );
        assert_eq!(parse_sql("UNLISTEN *").unwrap(), Command::Unlisten { channel: None });
        assert!(parse_sql("LISTEN ").is_err());
    }

    #[test]
    fn mutations_are_flagged() {
        assert!(parse_sql(&format!("DELETE FROM agents WHERE id = '{A}'")).unwrap().is_mutation());
        assert!(!parse_sql("SELECT * FROM agents").unwrap().is_mutation());
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO resources (id) VALUES ('{A}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
