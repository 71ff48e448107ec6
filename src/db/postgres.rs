//! PostgreSQL driver built on `tokio-postgres`.
//!
//! Without parameters a statement goes through the simple-query protocol:
//! the server sends every value as text, and a batch of statements yields
//! one result set per row-returning statement. With parameters the
//! statement is prepared; the prepared column list tells row statements
//! apart from the rest, and each typed column is rendered back to text so
//! the cell decoder sees the same representation either way.
//!
//! Types without a dedicated rendering fall back to their text form when
//! the server sends one, and to the raw wire bytes otherwise; no column
//! type fails the scan. Text parameters are parsed into the type the
//! server expects for numeric and boolean slots.

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::error::Error;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, SimpleQueryMessage};

use uuid::Uuid;

use crate::db::cell::Cell;
use crate::db::driver::{ConnectionConfig, Driver, Param, QueryOutcome, ResultSet, Row, Session};
use crate::db::error::DbError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Opens plain-TCP PostgreSQL sessions.
#[derive(Debug, Clone)]
pub struct PgDriver {
    connect_timeout: Duration,
}

impl PgDriver {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for PgDriver {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Driver for PgDriver {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Session>, DbError> {
        let open_err = |e: tokio_postgres::Error| DbError::Open {
            name: config.name.clone(),
            reason: describe(&e),
        };

        let mut pg = Config::new();
        pg.host(&config.host)
            .port(config.port)
            .user(&config.user)
            .password(&config.password)
            .dbname(&config.database)
            .connect_timeout(self.connect_timeout);

        let (client, connection) = pg.connect(NoTls).await.map_err(open_err)?;
        let name = config.name.clone();
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(connection = %name, error = %e, "Postgres connection error");
            }
        });

        // Fail at open time rather than on first use.
        client.simple_query("SELECT 1").await.map_err(open_err)?;

        Ok(Arc::new(PgSession { client, connection }))
    }
}

/// One client connection. `tokio-postgres` pipelines concurrent calls on it.
pub struct PgSession {
    client: Client,
    connection: JoinHandle<()>,
}

impl PgSession {
    async fn run_batch(&self, statement: &str) -> Result<QueryOutcome, DbError> {
        let messages = self
            .client
            .simple_query(statement)
            .await
            .map_err(statement_error)?;

        let mut sets = Vec::new();
        let mut current: Option<ResultSet> = None;
        let mut returned_rows = false;
        let mut affected = 0;

        for message in messages {
            match message {
                SimpleQueryMessage::RowDescription(columns) => {
                    returned_rows = true;
                    current = Some(ResultSet::new(
                        columns.iter().map(|c| c.name().to_string()).collect(),
                    ));
                }
                SimpleQueryMessage::Row(row) => {
                    returned_rows = true;
                    let set = current.get_or_insert_with(|| {
                        ResultSet::new(row.columns().iter().map(|c| c.name().to_string()).collect())
                    });
                    set.rows.push((0..row.len()).map(|i| Cell::from(row.get(i))).collect());
                }
                SimpleQueryMessage::CommandComplete(count) => match current.take() {
                    Some(set) => sets.push(set),
                    None => affected += count,
                },
                _ => {}
            }
        }
        if let Some(set) = current.take() {
            sets.push(set);
        }

        if returned_rows {
            Ok(QueryOutcome::Rows(sets))
        } else {
            Ok(QueryOutcome::Affected(affected))
        }
    }

    async fn run_prepared(&self, statement: &str, params: &[Param]) -> Result<QueryOutcome, DbError> {
        let prepared = self
            .client
            .prepare(statement)
            .await
            .map_err(statement_error)?;
        check_params(params, prepared.params())?;
        let bound: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        if prepared.columns().is_empty() {
            let affected = self
                .client
                .execute(&prepared, &bound)
                .await
                .map_err(statement_error)?;
            return Ok(QueryOutcome::Affected(affected));
        }

        let mut set = ResultSet::new(prepared.columns().iter().map(|c| c.name().to_string()).collect());
        let rows = self
            .client
            .query(&prepared, &bound)
            .await
            .map_err(statement_error)?;
        for row in &rows {
            set.rows.push(render_row(row)?);
        }
        Ok(QueryOutcome::Rows(vec![set]))
    }
}

#[async_trait]
impl Session for PgSession {
    async fn run(&self, statement: &str, params: &[Param]) -> Result<QueryOutcome, DbError> {
        if params.is_empty() {
            self.run_batch(statement).await
        } else {
            self.run_prepared(statement, params).await
        }
    }

    async fn close(&self) -> Result<(), DbError> {
        self.connection.abort();
        Ok(())
    }
}

/// Encodes every parameter up front so a value the slot can't take is
/// reported against its position instead of as a generic statement error.
fn check_params(params: &[Param], types: &[Type]) -> Result<(), DbError> {
    let mut scratch = BytesMut::new();
    for (index, (param, ty)) in params.iter().zip(types).enumerate() {
        scratch.clear();
        param.to_sql(ty, &mut scratch).map_err(|e| DbError::Bind {
            index,
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

fn statement_error(e: tokio_postgres::Error) -> DbError {
    DbError::Statement(describe(&e))
}

/// Server message with SQLSTATE and detail, or the client-side cause chain.
fn describe(e: &tokio_postgres::Error) -> String {
    if let Some(db) = e.as_db_error() {
        let mut message = format!("{} (SQLSTATE {})", db.message(), db.code().code());
        if let Some(detail) = db.detail() {
            message.push_str(": ");
            message.push_str(detail);
        }
        return message;
    }
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn render_row(row: &tokio_postgres::Row) -> Result<Row, DbError> {
    (0..row.len()).map(|idx| render_cell(row, idx)).collect()
}

fn render_cell(row: &tokio_postgres::Row, idx: usize) -> Result<Cell, DbError> {
    let column = &row.columns()[idx];
    let ty = column.type_();

    let text = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)
            .map(|v| v.map(|b| if b { b"1".to_vec() } else { b"0".to_vec() }))
    } else if *ty == Type::INT2 {
        display::<i16>(row, idx)
    } else if *ty == Type::INT4 {
        display::<i32>(row, idx)
    } else if *ty == Type::INT8 {
        display::<i64>(row, idx)
    } else if *ty == Type::OID {
        display::<u32>(row, idx)
    } else if *ty == Type::FLOAT4 {
        display::<f32>(row, idx)
    } else if *ty == Type::FLOAT8 {
        display::<f64>(row, idx)
    } else if *ty == Type::NUMERIC {
        display::<Numeric>(row, idx)
    } else if *ty == Type::MONEY {
        display::<Money>(row, idx)
    } else if *ty == Type::INTERVAL {
        display::<Interval>(row, idx)
    } else if *ty == Type::UUID {
        display::<Uuid>(row, idx)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        display::<serde_json::Value>(row, idx)
    } else if *ty == Type::INET {
        display::<IpAddr>(row, idx)
    } else if *ty == Type::BYTEA {
        row.try_get::<_, Option<Vec<u8>>>(idx)
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(idx)
            .map(|v| v.map(|t| t.format(TIMESTAMP_FORMAT).to_string().into_bytes()))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(idx)
            .map(|v| v.map(|t| t.format(TIMESTAMP_FORMAT).to_string().into_bytes()))
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(idx)
            .map(|v| v.map(|d| d.format("%Y-%m-%d").to_string().into_bytes()))
    } else if *ty == Type::TIME {
        row.try_get::<_, Option<NaiveTime>>(idx)
            .map(|v| v.map(|t| t.format("%H:%M:%S%.f").to_string().into_bytes()))
    } else if <String as FromSql<'_>>::accepts(ty) {
        row.try_get::<_, Option<String>>(idx)
            .map(|v| v.map(String::into_bytes))
    } else {
        row.try_get::<_, Option<Raw>>(idx).map(|v| v.map(|raw| raw.0))
    };

    text.map(Cell::from).map_err(|e| DbError::Scan {
        column: column.name().to_string(),
        reason: describe(&e),
    })
}

fn display<'a, T>(row: &'a tokio_postgres::Row, idx: usize) -> Result<Option<Vec<u8>>, tokio_postgres::Error>
where
    T: FromSql<'a> + ToString,
{
    row.try_get::<_, Option<T>>(idx)
        .map(|v| v.map(|n| n.to_string().into_bytes()))
}

type WireError = Box<dyn Error + Sync + Send>;

/// Wire bytes of a column with no dedicated rendering.
struct Raw(Vec<u8>);

impl<'a> FromSql<'a> for Raw {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, WireError> {
        Ok(Raw(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// NUMERIC in its exact decimal text form, e.g. `2.50`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Numeric(String);

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'a> FromSql<'a> for Numeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, WireError> {
        decode_numeric(raw).map(Numeric)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn read_u16(raw: &[u8], at: usize) -> Result<u16, WireError> {
    raw.get(at..at + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated value".into())
}

fn read_i32(raw: &[u8], at: usize) -> Result<i32, WireError> {
    raw.get(at..at + 4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| "truncated value".into())
}

fn read_i64(raw: &[u8], at: usize) -> Result<i64, WireError> {
    raw.get(at..at + 8)
        .and_then(|b| b.try_into().ok())
        .map(i64::from_be_bytes)
        .ok_or_else(|| "truncated value".into())
}

/// Binary NUMERIC: ndigits, weight, sign, dscale, then base-10000 digits
/// with the first digit at 10000^weight.
fn decode_numeric(raw: &[u8]) -> Result<String, WireError> {
    let ndigits = usize::from(read_u16(raw, 0)?);
    let weight = i32::from(read_u16(raw, 2)? as i16);
    let sign = read_u16(raw, 4)?;
    let dscale = usize::from(read_u16(raw, 6)?);
    if raw.len() != 8 + 2 * ndigits {
        return Err("numeric length mismatch".into());
    }
    let digits = (0..ndigits)
        .map(|i| read_u16(raw, 8 + 2 * i))
        .collect::<Result<Vec<u16>, _>>()?;

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign {other:#06x}").into()),
    }

    let digit = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for i in 1..=weight {
            out.push_str(&format!("{:04}", digit(i)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

/// Writes decimal text such as `-12.034` or `NaN` as binary NUMERIC.
fn encode_numeric(text: &str, out: &mut BytesMut) -> Result<(), WireError> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("nan") {
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(&NUMERIC_NAN.to_be_bytes());
        out.extend_from_slice(&[0, 0]);
        return Ok(());
    }

    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if int_part.len() + frac_part.len() == 0 || !all_digits(int_part) || !all_digits(frac_part) {
        return Err(format!("invalid numeric {text:?}").into());
    }
    let dscale = u16::try_from(frac_part.len()).map_err(|_| "numeric scale out of range")?;

    let int_part = int_part.trim_start_matches('0');
    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let padded = format!("{}{}{}{}", "0".repeat(int_pad), int_part, frac_part, "0".repeat(frac_pad));

    let mut digits: Vec<i16> = padded
        .as_bytes()
        .chunks(4)
        .map(|group| group.iter().fold(0i16, |acc, b| acc * 10 + i16::from(b - b'0')))
        .collect();
    let mut weight = i32::try_from((int_part.len() + int_pad) / 4).map_err(|_| "numeric out of range")? - 1;

    let leading = digits.iter().take_while(|d| **d == 0).count();
    digits.drain(..leading);
    weight -= i32::try_from(leading).map_err(|_| "numeric out of range")?;
    while digits.last() == Some(&0) {
        digits.pop();
    }
    if digits.is_empty() {
        weight = 0;
    }

    let ndigits = i16::try_from(digits.len()).map_err(|_| "numeric out of range")?;
    let weight = i16::try_from(weight).map_err(|_| "numeric out of range")?;
    let sign = if negative && !digits.is_empty() { NUMERIC_NEG } else { NUMERIC_POS };

    out.extend_from_slice(&ndigits.to_be_bytes());
    out.extend_from_slice(&weight.to_be_bytes());
    out.extend_from_slice(&sign.to_be_bytes());
    out.extend_from_slice(&dscale.to_be_bytes());
    for d in digits {
        out.extend_from_slice(&d.to_be_bytes());
    }
    Ok(())
}

/// MONEY as a plain decimal with two fraction digits, without currency
/// symbol or grouping.
struct Money(i64);

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let cents = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", cents / 100, cents % 100)
    }
}

impl<'a> FromSql<'a> for Money {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, WireError> {
        read_i64(raw, 0).map(Money)
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::MONEY
    }
}

/// INTERVAL in the server's default `postgres` output style, e.g.
/// `1 year 2 mons 3 days 04:05:06.5`.
struct Interval {
    micros: i64,
    days: i32,
    months: i32,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        let (years, months) = (self.months / 12, self.months % 12);
        for (count, unit) in [(years, "year"), (months, "mon"), (self.days, "day")] {
            if count != 0 {
                let plural = if count == 1 { "" } else { "s" };
                parts.push(format!("{count} {unit}{plural}"));
            }
        }
        if self.micros != 0 || parts.is_empty() {
            let sign = if self.micros < 0 { "-" } else { "" };
            let total = self.micros.unsigned_abs();
            let secs = total / 1_000_000;
            let mut clock = format!("{sign}{:02}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60);
            let fraction = total % 1_000_000;
            if fraction != 0 {
                let digits = format!("{fraction:06}");
                clock.push('.');
                clock.push_str(digits.trim_end_matches('0'));
            }
            parts.push(clock);
        }
        f.write_str(&parts.join(" "))
    }
}

impl<'a> FromSql<'a> for Interval {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, WireError> {
        Ok(Interval {
            micros: read_i64(raw, 0)?,
            days: read_i32(raw, 8)?,
            months: read_i32(raw, 12)?,
        })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

fn parse_bool(text: &str) -> Result<bool, WireError> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(format!("invalid boolean {text:?}").into()),
    }
}

/// Encodes a text argument for the parameter type the server inferred.
fn text_to_sql(text: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, WireError> {
    let invalid = |kind: &str| -> WireError { format!("invalid {kind} {text:?}").into() };
    let trimmed = text.trim();
    if *ty == Type::BOOL {
        parse_bool(text)?.to_sql(ty, out)
    } else if *ty == Type::INT2 {
        trimmed.parse::<i16>().map_err(|_| invalid("int2"))?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        trimmed.parse::<i32>().map_err(|_| invalid("int4"))?.to_sql(ty, out)
    } else if *ty == Type::INT8 {
        trimmed.parse::<i64>().map_err(|_| invalid("int8"))?.to_sql(ty, out)
    } else if *ty == Type::OID {
        trimmed.parse::<u32>().map_err(|_| invalid("oid"))?.to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        trimmed.parse::<f32>().map_err(|_| invalid("float4"))?.to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        trimmed.parse::<f64>().map_err(|_| invalid("float8"))?.to_sql(ty, out)
    } else if *ty == Type::NUMERIC {
        encode_numeric(text, out).map(|()| IsNull::No)
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        serde_json::from_str::<serde_json::Value>(text)
            .map_err(|_| invalid("json"))?
            .to_sql(ty, out)
    } else if *ty == Type::UUID {
        Uuid::parse_str(trimmed).map_err(|_| invalid("uuid"))?.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMP || *ty == Type::TIMESTAMPTZ {
        let time = Cell::from(text).to_time().map_err(|_| invalid("timestamp"))?.value;
        Param::Time(time).to_sql(ty, out)
    } else {
        text.to_sql(ty, out)
    }
}

impl ToSql for Param {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, WireError> {
        match self {
            Param::Null => Ok(IsNull::Yes),
            Param::Bool(v) => v.to_sql(ty, out),
            Param::Int(v) => {
                if *ty == Type::INT2 {
                    i16::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*v)?.to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*v as f64).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    encode_numeric(&v.to_string(), out).map(|()| IsNull::No)
                } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    v.to_string().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Param::Float(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if *ty == Type::NUMERIC && v.is_finite() {
                    encode_numeric(&v.to_string(), out).map(|()| IsNull::No)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Param::Text(v) => text_to_sql(v, ty, out),
            Param::Bytes(v) => v.to_sql(ty, out),
            Param::Time(v) => {
                if *ty == Type::TIMESTAMP {
                    v.naive_utc().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
