//! Разбор анкеты подключения из сообщения вида `ключ: значение` по строкам.

use crate::db::{ConnectionType, EquipmentCharge, NewConnection};
use thiserror::Error;

pub const FORM_TEMPLATE: &str = "Отправьте /connection и анкету, по одному полю в строке:

/connection
type: мкд | чс | юр
address: ул. Ленина, 1, кв. 5
port: 12
executors: 3, 7
fiber: 120,5
twisted: 15
material_payer: 3
router: Keenetic Lite
router_qty: 1
router_payer: 3
snr: SNR-CPE
snr_payer: 3
onu: HG8245
onu_qty: 1
onu_payer: 7
media: -
media_qty: 0
media_payer: 7
contract: да
router_access: нет
bot: да
photos: file_id_1, file_id_2

Обязательны address и executors. Модель «-» или «none» означает, что оборудование не ставилось.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("Анкета пуста")]
    Empty,
    #[error("Строка без двоеточия: «{0}»")]
    MalformedLine(String),
    #[error("Неизвестное поле «{0}»")]
    UnknownKey(String),
    #[error("Поле «{0}» указано дважды")]
    DuplicateKey(String),
    #[error("Не заполнено поле «{0}»")]
    MissingField(&'static str),
    #[error("Поле «{key}»: «{value}» не число")]
    InvalidNumber { key: String, value: String },
    #[error("Поле «{0}»: значение не может быть отрицательным")]
    Negative(String),
    #[error("Поле «{key}»: ожидается да/нет, получено «{value}»")]
    InvalidFlag { key: String, value: String },
    #[error("Неизвестный тип подключения «{0}»")]
    InvalidType(String),
}

const KEYS: [&str; 22] = [
    "type",
    "address",
    "port",
    "executors",
    "fiber",
    "twisted",
    "material_payer",
    "router",
    "router_qty",
    "router_payer",
    "snr",
    "snr_payer",
    "onu",
    "onu_qty",
    "onu_payer",
    "media",
    "media_qty",
    "media_payer",
    "contract",
    "router_access",
    "bot",
    "photos",
];

/// Метраж: допускает запятую как десятичный разделитель.
pub fn parse_meters(key: &str, value: &str) -> Result<f64, FormError> {
    let normalized = value.trim().replace(',', ".");
    let parsed = normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FormError::InvalidNumber {
            key: key.to_string(),
            value: value.trim().to_string(),
        })?;
    if parsed < 0.0 {
        return Err(FormError::Negative(key.to_string()));
    }
    Ok(parsed)
}

pub fn parse_count(key: &str, value: &str) -> Result<i64, FormError> {
    let parsed = value
        .trim()
        .parse::<i64>()
        .map_err(|_| FormError::InvalidNumber {
            key: key.to_string(),
            value: value.trim().to_string(),
        })?;
    if parsed < 0 {
        return Err(FormError::Negative(key.to_string()));
    }
    Ok(parsed)
}

fn parse_id(key: &str, value: &str) -> Result<i64, FormError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| FormError::InvalidNumber {
            key: key.to_string(),
            value: value.trim().to_string(),
        })
}

fn parse_optional_id(key: &str, value: &str) -> Result<Option<i64>, FormError> {
    let value = value.trim();
    if value.is_empty() || value == "-" {
        return Ok(None);
    }
    parse_id(key, value).map(Some)
}

fn parse_flag(key: &str, value: &str) -> Result<bool, FormError> {
    match value.trim().to_lowercase().as_str() {
        "да" | "yes" | "y" | "1" | "+" | "true" => Ok(true),
        "нет" | "no" | "n" | "0" | "-" | "false" | "" => Ok(false),
        other => Err(FormError::InvalidFlag {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split([',', ' '])
        .map(str::trim)
        .filter(|part| !part.is_empty())
}

struct Fields<'a> {
    entries: Vec<(&'static str, &'a str)>,
}

impl<'a> Fields<'a> {
    fn get(&self, key: &str) -> Option<&'a str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
    }

    /// Без `qty_key` (SNR бокс) количество всегда 1.
    fn charge(
        &self,
        model_key: &str,
        qty_key: Option<&str>,
        payer_key: &str,
    ) -> Result<EquipmentCharge, FormError> {
        let Some(model) = self.get(model_key) else {
            return Ok(EquipmentCharge::none());
        };
        let quantity = match qty_key.and_then(|key| self.get(key).map(|raw| (key, raw))) {
            Some((key, raw)) => parse_count(key, raw)?,
            None => 1,
        };
        let mut charge = EquipmentCharge::new(model.trim(), quantity);
        if let Some(payer) = self.get(payer_key) {
            charge.payer_id = parse_optional_id(payer_key, payer)?;
        }
        Ok(charge)
    }
}

/// Разбирает анкету. Первая строка с командой, если есть, пропускается.
pub fn parse_connection_form(text: &str) -> Result<NewConnection, FormError> {
    let mut entries: Vec<(&'static str, &str)> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('/') {
            continue;
        }
        let (raw_key, value) = line
            .split_once(':')
            .ok_or_else(|| FormError::MalformedLine(line.to_string()))?;
        let raw_key = raw_key.trim().to_lowercase();
        let key = KEYS
            .iter()
            .copied()
            .find(|known| *known == raw_key)
            .ok_or_else(|| FormError::UnknownKey(raw_key.clone()))?;
        if entries.iter().any(|(k, _)| *k == key) {
            return Err(FormError::DuplicateKey(key.to_string()));
        }
        entries.push((key, value.trim()));
    }
    if entries.is_empty() {
        return Err(FormError::Empty);
    }
    let fields = Fields { entries };

    let address = fields
        .get("address")
        .filter(|v| !v.is_empty())
        .ok_or(FormError::MissingField("address"))?;
    let executor_ids = split_list(fields.get("executors").unwrap_or(""))
        .map(|id| parse_id("executors", id))
        .collect::<Result<Vec<_>, _>>()?;
    if executor_ids.is_empty() {
        return Err(FormError::MissingField("executors"));
    }

    let fiber = match fields.get("fiber") {
        Some(raw) => parse_meters("fiber", raw)?,
        None => 0.0,
    };
    let twisted = match fields.get("twisted") {
        Some(raw) => parse_meters("twisted", raw)?,
        None => 0.0,
    };

    let mut new = NewConnection::new(address, executor_ids, fiber, twisted);
    if let Some(raw) = fields.get("type") {
        new.connection_type = ConnectionType::parse_user_input(raw)
            .ok_or_else(|| FormError::InvalidType(raw.to_string()))?;
    }
    if let Some(port) = fields.get("port").filter(|v| !v.is_empty()) {
        new.port = port.to_string();
    }
    if let Some(raw) = fields.get("material_payer") {
        new.material_payer_id = parse_optional_id("material_payer", raw)?;
    }
    new.router = fields.charge("router", Some("router_qty"), "router_payer")?;
    new.snr_box = fields.charge("snr", None, "snr_payer")?;
    new.onu = fields.charge("onu", Some("onu_qty"), "onu_payer")?;
    new.media_converter = fields.charge("media", Some("media_qty"), "media_payer")?;
    if let Some(raw) = fields.get("contract") {
        new.contract_signed = parse_flag("contract", raw)?;
    }
    if let Some(raw) = fields.get("router_access") {
        new.router_access = parse_flag("router_access", raw)?;
    }
    if let Some(raw) = fields.get("bot") {
        new.telegram_bot_connected = parse_flag("bot", raw)?;
    }
    if let Some(raw) = fields.get("photos") {
        new.photo_file_ids = split_list(raw).map(str::to_string).collect();
    }
    Ok(new)
}
