//! Сущности учёта: сотрудники, остатки, подключения и журнал движений.

use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Неизвестное значение «{0}»")]
pub struct UnknownValue(pub String);

/// Кабель учитывается в метрах на балансе сотрудника.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CableKind {
    Fiber,
    TwistedPair,
}

impl CableKind {
    pub const ALL: [CableKind; 2] = [CableKind::Fiber, CableKind::TwistedPair];

    pub fn as_str(self) -> &'static str {
        match self {
            CableKind::Fiber => "fiber",
            CableKind::TwistedPair => "twisted_pair",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CableKind::Fiber => "ВОЛС",
            CableKind::TwistedPair => "Витая пара",
        }
    }
}

/// Оборудование учитывается поштучно, по моделям.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EquipmentKind {
    Router,
    SnrBox,
    Onu,
    MediaConverter,
}

impl EquipmentKind {
    pub const ALL: [EquipmentKind; 4] = [
        EquipmentKind::Router,
        EquipmentKind::SnrBox,
        EquipmentKind::Onu,
        EquipmentKind::MediaConverter,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EquipmentKind::Router => "router",
            EquipmentKind::SnrBox => "snr_box",
            EquipmentKind::Onu => "onu",
            EquipmentKind::MediaConverter => "media_converter",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EquipmentKind::Router => "Роутер",
            EquipmentKind::SnrBox => "SNR бокс",
            EquipmentKind::Onu => "ONU",
            EquipmentKind::MediaConverter => "Медиаконвертер",
        }
    }

    /// Таблица остатков для этого вида оборудования.
    pub(crate) fn table(self) -> &'static str {
        match self {
            EquipmentKind::Router => "employee_routers",
            EquipmentKind::SnrBox => "employee_snr_boxes",
            EquipmentKind::Onu => "employee_onu",
            EquipmentKind::MediaConverter => "employee_media_converters",
        }
    }

    /// Разбор ввода пользователя: принимает и служебные, и русские названия.
    pub fn parse_user_input(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "router" | "роутер" => Some(EquipmentKind::Router),
            "snr" | "snr_box" | "бокс" => Some(EquipmentKind::SnrBox),
            "onu" | "ону" => Some(EquipmentKind::Onu),
            "media" | "media_converter" | "медиаконвертер" | "мк" => {
                Some(EquipmentKind::MediaConverter)
            }
            _ => None,
        }
    }
}

impl FromStr for EquipmentKind {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EquipmentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownValue(s.to_string()))
    }
}

/// Вид позиции в журнале движений.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemKind {
    Cable(CableKind),
    Equipment(EquipmentKind),
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Cable(cable) => cable.as_str(),
            ItemKind::Equipment(kind) => kind.as_str(),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemKind::Cable(cable) => cable.label(),
            ItemKind::Equipment(kind) => kind.label(),
        }
    }

    pub fn amount(self, value: f64) -> Amount {
        match self {
            ItemKind::Cable(_) => Amount::Meters(value),
            ItemKind::Equipment(_) => Amount::Pieces(value.round() as i64),
        }
    }
}

impl FromStr for ItemKind {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(cable) = CableKind::ALL.into_iter().find(|c| c.as_str() == s) {
            return Ok(ItemKind::Cable(cable));
        }
        s.parse::<EquipmentKind>().map(ItemKind::Equipment)
    }
}

impl TryFrom<String> for ItemKind {
    type Error = UnknownValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Количество с единицей измерения: метры кабеля или штуки оборудования.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Amount {
    Meters(f64),
    Pieces(i64),
}

impl Amount {
    pub fn as_f64(self) -> f64 {
        match self {
            Amount::Meters(value) => value,
            Amount::Pieces(value) => value as f64,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Meters(value) => write!(f, "{:.2} м", value),
            Amount::Pieces(value) => write!(f, "{} шт.", value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Add,
    Deduct,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Deduct => "deduct",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Operation::Add => "Добавление",
            Operation::Deduct => "Списание",
        }
    }
}

impl TryFrom<String> for Operation {
    type Error = UnknownValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "add" => Ok(Operation::Add),
            "deduct" => Ok(Operation::Deduct),
            _ => Err(UnknownValue(value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    /// Многоквартирный дом.
    Mkd,
    /// Частный сектор.
    Chs,
    /// Юридические лица и госучреждения.
    Legal,
}

impl ConnectionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionType::Mkd => "mkd",
            ConnectionType::Chs => "chs",
            ConnectionType::Legal => "legal",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConnectionType::Mkd => "МКД",
            ConnectionType::Chs => "ЧС",
            ConnectionType::Legal => "Юр / Гос",
        }
    }

    pub fn parse_user_input(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "mkd" | "мкд" => Some(ConnectionType::Mkd),
            "chs" | "чс" => Some(ConnectionType::Chs),
            "legal" | "юр" | "гос" | "юр / гос" => Some(ConnectionType::Legal),
            _ => None,
        }
    }
}

impl TryFrom<String> for ConnectionType {
    type Error = UnknownValue;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "mkd" => Ok(ConnectionType::Mkd),
            "chs" => Ok(ConnectionType::Chs),
            "legal" => Ok(ConnectionType::Legal),
            _ => Err(UnknownValue(value)),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Employee {
    pub id: i64,
    pub full_name: String,
    pub fiber_balance: f64,
    pub twisted_pair_balance: f64,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct EquipmentHolding {
    pub id: i64,
    pub employee_id: i64,
    pub item_name: String,
    pub quantity: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Connection {
    pub id: i64,
    #[sqlx(try_from = "String")]
    pub connection_type: ConnectionType,
    pub address: String,
    pub port: String,
    pub router_model: String,
    pub router_quantity: i64,
    pub snr_box_model: String,
    pub onu_model: String,
    pub onu_quantity: i64,
    pub media_converter_model: String,
    pub media_converter_quantity: i64,
    pub fiber_meters: f64,
    pub twisted_pair_meters: f64,
    pub contract_signed: bool,
    pub router_access: bool,
    pub telegram_bot_connected: bool,
    pub created_by: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct ExecutorRef {
    pub id: i64,
    pub full_name: String,
}

/// Подключение вместе с исполнителями и фото.
#[derive(Debug, Clone)]
pub struct ConnectionDetails {
    pub connection: Connection,
    pub executors: Vec<ExecutorRef>,
    pub photos: Vec<String>,
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct MovementRow {
    pub id: i64,
    pub employee_id: i64,
    #[sqlx(try_from = "String")]
    pub operation_type: Operation,
    #[sqlx(try_from = "String")]
    pub item_type: ItemKind,
    pub item_name: String,
    pub quantity: f64,
    pub balance_after: f64,
    pub connection_id: Option<i64>,
    pub created_by: Option<i64>,
    pub created_at: i64,
}

/// Запись журнала движений. Только добавляется, никогда не меняется.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementEntry {
    pub id: i64,
    pub employee_id: i64,
    pub operation: Operation,
    pub item: ItemKind,
    pub item_name: String,
    pub quantity: Amount,
    pub balance_after: Amount,
    pub connection_id: Option<i64>,
    pub created_by: Option<i64>,
    pub created_at: i64,
}

impl MovementEntry {
    /// Изменение остатка со знаком: списание отрицательное.
    pub fn signed_delta(&self) -> f64 {
        match self.operation {
            Operation::Add => self.quantity.as_f64(),
            Operation::Deduct => -self.quantity.as_f64(),
        }
    }
}

impl From<MovementRow> for MovementEntry {
    fn from(row: MovementRow) -> Self {
        Self {
            id: row.id,
            employee_id: row.employee_id,
            operation: row.operation_type,
            item: row.item_type,
            item_name: row.item_name,
            quantity: row.item_type.amount(row.quantity),
            balance_after: row.item_type.amount(row.balance_after),
            connection_id: row.connection_id,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_kind_round_trips_through_storage_tag() {
        for cable in CableKind::ALL {
            let kind = ItemKind::Cable(cable);
            assert_eq!(kind.as_str().parse::<ItemKind>().unwrap(), kind);
        }
        for equipment in EquipmentKind::ALL {
            let kind = ItemKind::Equipment(equipment);
            assert_eq!(kind.as_str().parse::<ItemKind>().unwrap(), kind);
        }
        assert!("cable".parse::<ItemKind>().is_err());
    }

    #[test]
    fn amounts_follow_item_semantics() {
        assert_eq!(
            ItemKind::Cable(CableKind::Fiber).amount(12.5),
            Amount::Meters(12.5)
        );
        assert_eq!(
            ItemKind::Equipment(EquipmentKind::Onu).amount(3.0),
            Amount::Pieces(3)
        );
        assert_eq!(Amount::Meters(12.5).to_string(), "12.50 м");
        assert_eq!(Amount::Pieces(3).to_string(), "3 шт.");
    }

    #[test]
    fn user_input_aliases() {
        assert_eq!(
            EquipmentKind::parse_user_input("Роутер"),
            Some(EquipmentKind::Router)
        );
        assert_eq!(
            EquipmentKind::parse_user_input("media"),
            Some(EquipmentKind::MediaConverter)
        );
        assert_eq!(
            ConnectionType::parse_user_input("ЧС"),
            Some(ConnectionType::Chs)
        );
        assert_eq!(ConnectionType::parse_user_input("дача"), None);
    }
}
