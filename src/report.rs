//! Выгрузка отчёта в Excel (.xlsx): лист подключений с итогами и, для отчёта
//! по сотруднику, отдельный лист движения материалов.

use crate::db::{Amount, Report, ReportConnection};
use chrono::{Local, TimeZone};
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet};

const REPORT_SHEET: &str = "Отчёт";
const MOVEMENTS_SHEET: &str = "Движение материалов";

const CONNECTION_HEADER: [(&str, f64); 16] = [
    ("№", 6.0),
    ("Дата", 17.0),
    ("Тип", 12.0),
    ("Адрес", 30.0),
    ("Порт", 8.0),
    ("Исполнители", 25.0),
    ("ВОЛС, м", 10.0),
    ("Витая пара, м", 12.0),
    ("ВОЛС (доля), м", 14.0),
    ("Витая пара (доля), м", 18.0),
    ("Роутер", 15.0),
    ("Кол-во роутеров", 10.0),
    ("Списанное оборудование", 30.0),
    ("Договор", 9.0),
    ("Доступ к роутеру", 10.0),
    ("Бот", 6.0),
];

const MOVEMENT_HEADER: [(&str, f64); 7] = [
    ("Дата", 17.0),
    ("Операция", 12.0),
    ("Позиция", 15.0),
    ("Наименование", 20.0),
    ("Количество", 12.0),
    ("Остаток", 12.0),
    ("Подключение", 12.0),
];

/// Ячейка листа до записи в книгу.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Title(String),
    Header(String),
    Text(String),
    Meters(f64),
    Count(i64),
    Empty,
}

impl Cell {
    fn text(value: impl Into<String>) -> Self {
        Cell::Text(value.into())
    }

    fn amount(value: Amount) -> Self {
        match value {
            Amount::Meters(meters) => Cell::Meters(meters),
            Amount::Pieces(pieces) => Cell::Count(pieces),
        }
    }
}

type Row = Vec<Cell>;

fn format_timestamp(ts: i64) -> String {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%d.%m.%Y %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn yes_no(value: bool) -> &'static str {
    if value { "Да" } else { "Нет" }
}

fn header_row(header: &[(&str, f64)]) -> Row {
    header.iter().map(|(name, _)| Cell::Header(name.to_string())).collect()
}

fn connection_row(row: &ReportConnection) -> Row {
    let c = &row.connection;
    let equipment = row
        .equipment
        .iter()
        .map(|spent| format!("{} {} x{}", spent.kind.label(), spent.item_name, spent.quantity))
        .collect::<Vec<_>>()
        .join(", ");
    vec![
        Cell::Count(c.id),
        Cell::text(format_timestamp(c.created_at)),
        Cell::text(c.connection_type.label()),
        Cell::text(c.address.as_str()),
        Cell::text(c.port.as_str()),
        Cell::text(row.executors.join(", ")),
        Cell::Meters(c.fiber_meters),
        Cell::Meters(c.twisted_pair_meters),
        Cell::Meters(row.employee_fiber_meters),
        Cell::Meters(row.employee_twisted_pair_meters),
        Cell::text(c.router_model.as_str()),
        Cell::Count(c.router_quantity),
        Cell::text(equipment),
        Cell::text(yes_no(c.contract_signed)),
        Cell::text(yes_no(c.router_access)),
        Cell::text(yes_no(c.telegram_bot_connected)),
    ]
}

/// Строки листа «Отчёт»: шапка, подключения, итоги.
fn report_rows(report: &Report) -> Vec<Row> {
    let title = match &report.employee_name {
        Some(name) => format!("Отчёт по сотруднику: {}", name),
        None => "Общий отчёт: все сотрудники".to_string(),
    };
    let mut rows = vec![
        vec![Cell::Title(title)],
        vec![Cell::text("Период"), Cell::text(report.period.label())],
        vec![Cell::Empty],
        header_row(&CONNECTION_HEADER),
    ];
    rows.extend(report.connections.iter().map(connection_row));
    rows.push(vec![Cell::Empty]);

    let stats = &report.stats;
    rows.push(vec![
        Cell::Header("Итого подключений".to_string()),
        Cell::Count(stats.total_connections),
    ]);
    let totals = [
        ("ВОЛС по карточкам, м", stats.total_connection_fiber_meters),
        (
            "Витая пара по карточкам, м",
            stats.total_connection_twisted_pair_meters,
        ),
        ("ВОЛС по долям, м", stats.total_fiber_meters),
        ("Витая пара по долям, м", stats.total_twisted_pair_meters),
    ];
    for (label, value) in totals {
        rows.push(vec![Cell::Header(label.to_string()), Cell::Meters(value)]);
    }
    for ((kind, item_name), quantity) in &stats.equipment_totals {
        rows.push(vec![
            Cell::text(format!("{}: {}", kind.label(), item_name)),
            Cell::Count(*quantity),
        ]);
    }
    rows
}

/// Строки листа движений; пусто, если движений за период нет.
fn movement_rows(report: &Report) -> Vec<Row> {
    if report.movements.is_empty() {
        return Vec::new();
    }
    let mut rows = vec![
        vec![Cell::Title(format!(
            "Движение материалов: {}",
            report.employee_name.as_deref().unwrap_or("все сотрудники")
        ))],
        vec![Cell::text("Период"), Cell::text(report.period.label())],
        vec![Cell::Empty],
        header_row(&MOVEMENT_HEADER),
    ];
    for movement in &report.movements {
        rows.push(vec![
            Cell::text(format_timestamp(movement.created_at)),
            Cell::text(movement.operation.label()),
            Cell::text(movement.item.label()),
            Cell::text(movement.item_name.as_str()),
            Cell::amount(movement.quantity),
            Cell::amount(movement.balance_after),
            movement
                .connection_id
                .map(Cell::Count)
                .unwrap_or_else(|| Cell::text("-")),
        ]);
    }
    rows
}

struct Formats {
    title: Format,
    header: Format,
    meters: Format,
}

impl Formats {
    fn new() -> Self {
        Self {
            title: Format::new().set_bold().set_font_size(14),
            header: Format::new()
                .set_bold()
                .set_font_color(Color::White)
                .set_background_color(Color::RGB(0x4472C4)),
            meters: Format::new().set_num_format("0.00"),
        }
    }
}

fn build_sheet(
    name: &str,
    columns: &[(&str, f64)],
    rows: &[Row],
    formats: &Formats,
) -> Result<Worksheet, anyhow::Error> {
    let mut sheet = Worksheet::new();
    sheet.set_name(name)?;
    for (col, (_, width)) in (0u16..).zip(columns) {
        sheet.set_column_width(col, *width)?;
    }
    for (row_idx, row) in (0u32..).zip(rows) {
        for (col, cell) in (0u16..).zip(row) {
            match cell {
                Cell::Title(text) => {
                    sheet.write_string_with_format(row_idx, col, text, &formats.title)?;
                }
                Cell::Header(text) => {
                    sheet.write_string_with_format(row_idx, col, text, &formats.header)?;
                }
                Cell::Text(text) => {
                    sheet.write_string(row_idx, col, text)?;
                }
                Cell::Meters(value) => {
                    sheet.write_number_with_format(row_idx, col, *value, &formats.meters)?;
                }
                Cell::Count(value) => {
                    sheet.write_number(row_idx, col, *value as f64)?;
                }
                Cell::Empty => {}
            }
        }
    }
    Ok(sheet)
}

/// Книга отчёта. Лист движений добавляется только при наличии движений.
pub fn render(report: &Report) -> Result<Vec<u8>, anyhow::Error> {
    let formats = Formats::new();
    let mut workbook = Workbook::new();
    workbook.push_worksheet(build_sheet(
        REPORT_SHEET,
        &CONNECTION_HEADER,
        &report_rows(report),
        &formats,
    )?);

    let movements = movement_rows(report);
    if !movements.is_empty() {
        workbook.push_worksheet(build_sheet(
            MOVEMENTS_SHEET,
            &MOVEMENT_HEADER,
            &movements,
            &formats,
        )?);
    }
    Ok(workbook.save_to_buffer()?)
}

/// Имя файла: `report_<сотрудник|all>_<дата начала>.xlsx`.
pub fn file_name(report: &Report) -> String {
    let who = report
        .employee_name
        .as_deref()
        .map(|name| name.split_whitespace().collect::<Vec<_>>().join("_"))
        .unwrap_or_else(|| "all".to_string());
    let start = Local
        .timestamp_opt(report.period.start, 0)
        .single()
        .map(|dt| dt.format("%Y%m%d").to_string())
        .unwrap_or_else(|| report.period.start.to_string());
    format!("report_{}_{}.xlsx", who, start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        CableKind, Connection, ConnectionType, EquipmentKind, EquipmentSpent, ItemKind,
        MovementEntry, Operation, ReportPeriod, ReportStats,
    };

    fn sample_connection() -> ReportConnection {
        ReportConnection {
            connection: Connection {
                id: 12,
                connection_type: ConnectionType::Chs,
                address: "ул. Садовая; 3".to_string(),
                port: "5".to_string(),
                router_model: "Keenetic".to_string(),
                router_quantity: 1,
                snr_box_model: "-".to_string(),
                onu_model: "HG8245".to_string(),
                onu_quantity: 1,
                media_converter_model: "-".to_string(),
                media_converter_quantity: 0,
                fiber_meters: 100.0,
                twisted_pair_meters: 15.5,
                contract_signed: true,
                router_access: false,
                telegram_bot_connected: true,
                created_by: 1,
                created_at: 1_767_225_600,
            },
            employee_count: 2,
            employee_fiber_meters: 50.0,
            employee_twisted_pair_meters: 7.75,
            executors: vec!["Алексеев".to_string(), "Иванов".to_string()],
            equipment: vec![EquipmentSpent {
                kind: EquipmentKind::Onu,
                item_name: "HG8245".to_string(),
                quantity: 1,
            }],
        }
    }

    fn sample_movement() -> MovementEntry {
        MovementEntry {
            id: 1,
            employee_id: 3,
            operation: Operation::Deduct,
            item: ItemKind::Cable(CableKind::Fiber),
            item_name: "ВОЛС".to_string(),
            quantity: Amount::Meters(50.0),
            balance_after: Amount::Meters(150.25),
            connection_id: Some(12),
            created_by: Some(1),
            created_at: 1_767_225_600,
        }
    }

    fn sample_report(employee_name: Option<&str>, movements: Vec<MovementEntry>) -> Report {
        let mut stats = ReportStats {
            total_connections: 1,
            total_fiber_meters: 50.0,
            total_twisted_pair_meters: 7.75,
            total_connection_fiber_meters: 100.0,
            total_connection_twisted_pair_meters: 15.5,
            ..ReportStats::default()
        };
        stats
            .equipment_totals
            .insert((EquipmentKind::Onu, "HG8245".to_string()), 1);
        Report {
            period: ReportPeriod {
                start: 1_767_225_600,
                end: 1_767_830_400,
            },
            employee_name: employee_name.map(str::to_string),
            connections: vec![sample_connection()],
            stats,
            movements,
        }
    }

    #[test]
    fn report_sheet_has_connections_and_totals() {
        let rows = report_rows(&sample_report(Some("Иванов Иван"), Vec::new()));
        assert_eq!(rows[0], vec![Cell::Title("Отчёт по сотруднику: Иванов Иван".to_string())]);
        assert_eq!(rows[3].len(), CONNECTION_HEADER.len());

        let connection = &rows[4];
        assert_eq!(connection.len(), CONNECTION_HEADER.len());
        assert_eq!(connection[0], Cell::Count(12));
        assert_eq!(connection[3], Cell::text("ул. Садовая; 3"));
        assert_eq!(connection[5], Cell::text("Алексеев, Иванов"));
        assert_eq!(connection[6..10], [
            Cell::Meters(100.0),
            Cell::Meters(15.5),
            Cell::Meters(50.0),
            Cell::Meters(7.75),
        ]);
        assert_eq!(connection[12], Cell::text("ONU HG8245 x1"));

        assert!(rows.contains(&vec![
            Cell::Header("Итого подключений".to_string()),
            Cell::Count(1),
        ]));
        assert!(rows.contains(&vec![Cell::text("ONU: HG8245"), Cell::Count(1)]));
    }

    #[test]
    fn movements_go_to_separate_sheet() {
        let report = sample_report(Some("Иванов Иван"), vec![sample_movement()]);
        let rows = movement_rows(&report);
        assert_eq!(rows[3].len(), MOVEMENT_HEADER.len());
        assert_eq!(rows[4][1..], [
            Cell::text("Списание"),
            Cell::text("ВОЛС"),
            Cell::text("ВОЛС"),
            Cell::Meters(50.0),
            Cell::Meters(150.25),
            Cell::Count(12),
        ]);
        assert!(movement_rows(&sample_report(None, Vec::new())).is_empty());
    }

    #[test]
    fn renders_xlsx_workbook() {
        let bytes = render(&sample_report(Some("Иванов Иван"), vec![sample_movement()])).unwrap();
        assert!(bytes.starts_with(b"PK"));
        let bytes = render(&sample_report(None, Vec::new())).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn file_names() {
        let report = sample_report(Some("Иванов  Иван"), Vec::new());
        assert!(file_name(&report).starts_with("report_Иванов_Иван_"));
        assert!(file_name(&sample_report(None, Vec::new())).starts_with("report_all_"));
        assert!(file_name(&report).ends_with(".xlsx"));
    }
}
