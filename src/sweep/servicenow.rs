use crate::error::FetchError;
use crate::sweep::config::{ItsmConfig, SweepConfig};
use crate::sweep::records::{RecordFetcher, RecordStatus, RemoteRecord, normalize_key};
use crate::sweep::util::one_line_excerpt;
use crate::sweep::warn::{self, WarnEvent};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use reqwest::blocking::Client;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::env;
use std::time::Duration;
use tracing::{debug, info};

const MAX_PAGES: u64 = 1_000;
const USER_LOOKUP_CHUNK: usize = 100;
const SERVICENOW_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const ITEM_FIELDS: &str = "number,sys_id,active,closed_at,closed_by,sys_updated_on";

#[derive(Clone)]
pub struct ServiceNowCredentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for ServiceNowCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceNowCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl ServiceNowCredentials {
    pub fn from_env() -> Result<Self, FetchError> {
        let user = env::var("HDCS_ITSM_USER").unwrap_or_default();
        let password = env::var("HDCS_ITSM_PASSWORD").unwrap_or_default();
        if user.trim().is_empty() || password.is_empty() {
            return Err(FetchError::Config(
                "set HDCS_ITSM_USER and HDCS_ITSM_PASSWORD (or pass --records FILE)".to_string(),
            ));
        }
        Ok(Self {
            user: user.trim().to_string(),
            password,
        })
    }
}

/// One catalog item row as it comes off the table API.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawItem {
    number: String,
    sys_id: String,
    active: String,
    closed_at: Option<DateTime<Utc>>,
    closed_by_id: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

pub fn parse_servicenow_time(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(trimmed, SERVICENOW_TIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Normalize the loosely typed lifecycle fields into a closed status.
///
/// A closed item is only retired once the retention window has passed and
/// nobody tagged it "Ready for Pickup"; a pickup tag keeps it active.
pub fn classify_status(
    active: &str,
    closed_at: Option<DateTime<Utc>>,
    pickup_tagged: bool,
    now: DateTime<Utc>,
    retention: TimeDelta,
) -> RecordStatus {
    match active.trim() {
        "true" => RecordStatus::Active,
        "false" => {
            if pickup_tagged {
                return RecordStatus::Active;
            }
            match closed_at {
                Some(closed) if now.signed_duration_since(closed) > retention => {
                    RecordStatus::Retired
                }
                Some(_) => RecordStatus::Active,
                None => RecordStatus::Unknown,
            }
        }
        _ => RecordStatus::Unknown,
    }
}

fn reference_value(value: Option<&Value>) -> Option<String> {
    let raw = match value? {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj.get("value")?.as_str()?.to_string(),
        _ => return None,
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn string_field(item: &Value, name: &str) -> String {
    item.get(name)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn parse_item(item: &Value) -> Option<RawItem> {
    let number = string_field(item, "number");
    if number.trim().is_empty() {
        return None;
    }
    Some(RawItem {
        number: normalize_key(&number),
        sys_id: string_field(item, "sys_id"),
        active: string_field(item, "active"),
        closed_at: parse_servicenow_time(&string_field(item, "closed_at")),
        closed_by_id: reference_value(item.get("closed_by")),
        updated_at: parse_servicenow_time(&string_field(item, "sys_updated_on")),
    })
}

fn result_rows(body: Value) -> Result<Vec<Value>, FetchError> {
    match body {
        Value::Object(mut obj) => match obj.remove("result") {
            Some(Value::Array(rows)) => Ok(rows),
            _ => Err(FetchError::Decode(
                "response has no `result` array".to_string(),
            )),
        },
        _ => Err(FetchError::Decode("response is not a JSON object".to_string())),
    }
}

pub fn record_url(instance: &str, table: &str, sys_id: &str) -> String {
    format!("https://{instance}/nav_to.do?uri={table}.do?sys_id={sys_id}")
}

/// Page through a table until a short page comes back. The flag is set when
/// `max_pages` full pages were read and more rows may exist.
fn collect_pages(
    page_size: u64,
    max_pages: u64,
    mut get_page: impl FnMut(u64) -> Result<Vec<Value>, FetchError>,
) -> Result<(Vec<RawItem>, bool), FetchError> {
    let mut out = Vec::new();
    for page in 0..max_pages {
        let rows = get_page(page * page_size)?;
        let fetched = rows.len() as u64;
        out.extend(rows.iter().filter_map(parse_item));
        if fetched < page_size {
            return Ok((out, false));
        }
    }
    Ok((out, true))
}

fn build_records(
    items: Vec<RawItem>,
    tagged: &HashSet<String>,
    users: &HashMap<String, String>,
    instance: &str,
    itsm: &ItsmConfig,
    now: DateTime<Utc>,
) -> Vec<RemoteRecord> {
    let retention = TimeDelta::weeks(itsm.retention_weeks as i64);
    items
        .into_iter()
        .map(|item| {
            let pickup_tagged = tagged.contains(&item.number);
            let status = classify_status(&item.active, item.closed_at, pickup_tagged, now, retention);
            let mut record = RemoteRecord::new(&item.number, status);
            if !item.sys_id.is_empty() {
                record.url = Some(record_url(instance, &itsm.table, &item.sys_id));
                record.sys_id = Some(item.sys_id);
            }
            record.closed_by = item
                .closed_by_id
                .as_ref()
                .and_then(|id| users.get(id).cloned());
            record.updated_at = item.updated_at;
            record.closed_at = item.closed_at;
            record.pickup_tagged = pickup_tagged;
            record
        })
        .collect()
}

pub struct ServiceNowFetcher {
    instance: String,
    base_url: String,
    credentials: ServiceNowCredentials,
    itsm: ItsmConfig,
    client: Client,
}

impl ServiceNowFetcher {
    pub fn new(cfg: &SweepConfig, credentials: ServiceNowCredentials) -> Result<Self, FetchError> {
        let instance = cfg.instance.trim().to_string();
        if instance.is_empty() {
            return Err(FetchError::Config(
                "instance is empty (config `instance` or HDCS_INSTANCE)".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.itsm.request_timeout_secs.max(1)))
            .build()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(Self {
            base_url: format!("https://{instance}"),
            instance,
            credentials,
            itsm: cfg.itsm.clone(),
            client,
        })
    }

    fn get_table(&self, table: &str, params: &[(&str, String)]) -> Result<Vec<Value>, FetchError> {
        let url = format!("{}/api/now/table/{table}", self.base_url);
        debug!(%url, ?params, "servicenow request");
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .header("Accept", "application/json")
            .query(params)
            .send()
            .map_err(|err| {
                if err.is_timeout() {
                    FetchError::Transport(format!("request to {url} timed out"))
                } else {
                    FetchError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(FetchError::Auth {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(FetchError::Http {
                url,
                status: status.as_u16(),
                body: one_line_excerpt(&body, 200),
            });
        }

        let body: Value = response
            .json()
            .map_err(|err| FetchError::Decode(err.to_string()))?;
        result_rows(body)
    }

    fn fetch_items(&self) -> Result<Vec<RawItem>, FetchError> {
        let page_size = self.itsm.page_size.max(1);
        let (items, capped) = collect_pages(page_size, MAX_PAGES, |offset| {
            self.get_table(
                &self.itsm.table,
                &[
                    ("sysparm_query", self.itsm.query.clone()),
                    ("sysparm_fields", ITEM_FIELDS.to_string()),
                    ("sysparm_exclude_reference_link", "true".to_string()),
                    ("sysparm_limit", page_size.to_string()),
                    ("sysparm_offset", offset.to_string()),
                ],
            )
        })?;
        if capped {
            warn::emit(WarnEvent {
                code: "ITSM_PAGE_CAP_REACHED",
                stage: "fetch",
                action: "page",
                folder: "",
                reason: "record-set-may-be-incomplete",
                err: &format!("stopped after {MAX_PAGES} pages of {page_size}"),
            });
        }
        Ok(items)
    }

    fn fetch_pickup_tagged(&self) -> Result<HashSet<String>, FetchError> {
        if self.itsm.pickup_label.trim().is_empty() {
            return Ok(HashSet::new());
        }
        let rows = self.get_table(
            "label_entry",
            &[
                (
                    "sysparm_query",
                    format!("label={}", self.itsm.pickup_label.trim()),
                ),
                ("sysparm_fields", "id_display".to_string()),
            ],
        )?;
        Ok(rows
            .iter()
            .map(|row| normalize_key(&string_field(row, "id_display")))
            .filter(|key| !key.is_empty())
            .collect())
    }

    fn resolve_users(&self, ids: &BTreeSet<String>) -> Result<HashMap<String, String>, FetchError> {
        let ids = ids.iter().cloned().collect::<Vec<_>>();
        let mut out = HashMap::new();
        for chunk in ids.chunks(USER_LOOKUP_CHUNK) {
            let rows = self.get_table(
                "sys_user",
                &[
                    ("sysparm_query", format!("sys_idIN{}", chunk.join(","))),
                    ("sysparm_fields", "sys_id,user_name".to_string()),
                ],
            )?;
            for row in rows {
                let id = string_field(&row, "sys_id");
                let name = string_field(&row, "user_name");
                if !id.is_empty() && !name.is_empty() {
                    out.insert(id, name);
                }
            }
        }
        Ok(out)
    }
}

impl RecordFetcher for ServiceNowFetcher {
    fn fetch_records(&self) -> Result<Vec<RemoteRecord>, FetchError> {
        let items = self.fetch_items()?;
        let tagged = self.fetch_pickup_tagged()?;
        let closers = items
            .iter()
            .filter(|item| item.active.trim() == "false")
            .filter_map(|item| item.closed_by_id.clone())
            .collect::<BTreeSet<_>>();
        // closed_by is display only; the pickup tags above decide retirement.
        let users = match self.resolve_users(&closers) {
            Ok(users) => users,
            Err(err) => {
                warn::emit(WarnEvent {
                    code: "ITSM_USER_LOOKUP_FAILED",
                    stage: "fetch",
                    action: "sys_user",
                    folder: "",
                    reason: "closed-by-names-omitted",
                    err: &err.to_string(),
                });
                HashMap::new()
            }
        };

        let records = build_records(items, &tagged, &users, &self.instance, &self.itsm, Utc::now());
        info!(
            instance = %self.instance,
            records = records.len(),
            pickup_tagged = tagged.len(),
            "fetched ITSM records"
        );
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("servicenow:{}", self.instance)
    }
}
