//! Создание подключения: одна транзакция на карточку, исполнителей, фото и
//! все списания материалов и оборудования.

use super::employees::require_employee;
use super::materials::round_cents;
use super::models::{ConnectionType, EquipmentKind};
use super::{Db, LedgerError, UnitOfWork};

/// Равная доля метража на одного исполнителя, округлённая до сантиметров.
pub fn round_share(total: f64, executors: usize) -> f64 {
    if executors == 0 {
        return total;
    }
    round_cents(total / executors as f64)
}

fn is_sentinel_model(model: &str) -> bool {
    let model = model.trim();
    model.is_empty() || model == "-" || model.eq_ignore_ascii_case("none")
}

/// Оборудование, выбранное для подключения, и с кого его списывать.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EquipmentCharge {
    pub model: String,
    pub quantity: i64,
    pub payer_id: Option<i64>,
}

impl EquipmentCharge {
    pub fn none() -> Self {
        Self {
            model: "-".to_string(),
            quantity: 0,
            payer_id: None,
        }
    }

    pub fn new(model: impl Into<String>, quantity: i64) -> Self {
        Self {
            model: model.into(),
            quantity,
            payer_id: None,
        }
    }

    pub fn paid_by(mut self, employee_id: i64) -> Self {
        self.payer_id = Some(employee_id);
        self
    }

    pub fn has_model(&self) -> bool {
        !is_sentinel_model(&self.model)
    }

    /// Модель «-»/«none» или нулевое количество: списывать нечего.
    pub fn is_skipped(&self) -> bool {
        !self.has_model() || self.quantity <= 0
    }

    pub(crate) fn stored_model(&self) -> &str {
        if self.has_model() {
            self.model.trim()
        } else {
            "-"
        }
    }

    pub(crate) fn stored_quantity(&self) -> i64 {
        if self.is_skipped() { 0 } else { self.quantity }
    }
}

impl Default for EquipmentCharge {
    fn default() -> Self {
        Self::none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewConnection {
    pub connection_type: ConnectionType,
    pub address: String,
    pub port: String,
    pub fiber_meters: f64,
    pub twisted_pair_meters: f64,
    pub executor_ids: Vec<i64>,
    /// Если не задан, метраж делится поровну между исполнителями.
    pub material_payer_id: Option<i64>,
    /// Списывается только при явно указанном плательщике.
    pub router: EquipmentCharge,
    /// Всегда одна штука.
    pub snr_box: EquipmentCharge,
    pub onu: EquipmentCharge,
    pub media_converter: EquipmentCharge,
    pub contract_signed: bool,
    pub router_access: bool,
    pub telegram_bot_connected: bool,
    pub photo_file_ids: Vec<String>,
}

impl NewConnection {
    pub fn new(
        address: impl Into<String>,
        executor_ids: Vec<i64>,
        fiber_meters: f64,
        twisted_pair_meters: f64,
    ) -> Self {
        Self {
            connection_type: ConnectionType::Mkd,
            address: address.into(),
            port: "-".to_string(),
            fiber_meters,
            twisted_pair_meters,
            executor_ids,
            material_payer_id: None,
            router: EquipmentCharge::none(),
            snr_box: EquipmentCharge::none(),
            onu: EquipmentCharge::none(),
            media_converter: EquipmentCharge::none(),
            contract_signed: false,
            router_access: false,
            telegram_bot_connected: false,
            photo_file_ids: Vec::new(),
        }
    }

    fn validate(&mut self) -> Result<(), LedgerError> {
        if self.address.trim().is_empty() {
            return Err(LedgerError::InvalidInput("Не указан адрес подключения".to_string()));
        }
        for (label, value) in [
            ("ВОЛС", self.fiber_meters),
            ("Витая пара", self.twisted_pair_meters),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(LedgerError::InvalidInput(format!(
                    "{}: некорректный метраж {}",
                    label, value
                )));
            }
        }

        let mut unique = Vec::with_capacity(self.executor_ids.len());
        for id in &self.executor_ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }
        if unique.is_empty() {
            return Err(LedgerError::InvalidInput(
                "Нужен хотя бы один исполнитель".to_string(),
            ));
        }
        self.executor_ids = unique;
        Ok(())
    }
}

/// Одно списание оборудования в рамках подключения.
struct PlannedDeduction<'a> {
    kind: EquipmentKind,
    payer_id: i64,
    model: &'a str,
    quantity: i64,
}

fn plan_equipment(new: &NewConnection) -> Vec<PlannedDeduction<'_>> {
    let first_executor = new.executor_ids[0];
    let mut planned = Vec::new();

    if !new.router.is_skipped()
        && let Some(payer_id) = new.router.payer_id
    {
        planned.push(PlannedDeduction {
            kind: EquipmentKind::Router,
            payer_id,
            model: new.router.model.trim(),
            quantity: new.router.quantity,
        });
    }
    if new.snr_box.has_model() {
        planned.push(PlannedDeduction {
            kind: EquipmentKind::SnrBox,
            payer_id: new.snr_box.payer_id.unwrap_or(first_executor),
            model: new.snr_box.model.trim(),
            quantity: 1,
        });
    }
    for (kind, charge) in [
        (EquipmentKind::Onu, &new.onu),
        (EquipmentKind::MediaConverter, &new.media_converter),
    ] {
        if !charge.is_skipped() {
            planned.push(PlannedDeduction {
                kind,
                payer_id: charge.payer_id.unwrap_or(first_executor),
                model: charge.model.trim(),
                quantity: charge.quantity,
            });
        }
    }
    planned
}

impl Db {
    /// Регистрирует подключение и списывает всё, что на него ушло.
    ///
    /// Либо всё применяется целиком, либо ничего: при любой ошибке транзакция
    /// откатывается, подключение не создаётся, возвращается причина.
    pub async fn create_connection(
        &self,
        actor: i64,
        mut new: NewConnection,
    ) -> Result<i64, LedgerError> {
        new.validate()?;
        let mut uow = self.begin(Some(actor)).await?;

        match self.settle_connection(&mut uow, &new).await {
            Ok(connection_id) => {
                uow.commit().await?;
                tracing::info!(
                    connection_id = connection_id,
                    actor = actor,
                    address = %new.address,
                    executors = ?new.executor_ids,
                    fiber = new.fiber_meters,
                    twisted_pair = new.twisted_pair_meters,
                    "Connection created"
                );
                Ok(connection_id)
            }
            Err(err) => {
                if let Err(rollback_err) = uow.rollback().await {
                    tracing::error!(error = %rollback_err, "Откат транзакции не удался");
                }
                if err.is_shortage() {
                    tracing::warn!(actor = actor, address = %new.address, error = %err, "Подключение не создано");
                } else {
                    tracing::error!(actor = actor, address = %new.address, error = %err, "Подключение не создано");
                }
                Err(err)
            }
        }
    }

    async fn settle_connection(
        &self,
        uow: &mut UnitOfWork,
        new: &NewConnection,
    ) -> Result<i64, LedgerError> {
        for employee_id in &new.executor_ids {
            require_employee(uow, *employee_id).await?;
        }

        let connection_id = self.connections.insert(uow, new).await?;
        self.connections
            .link_executors(uow, connection_id, &new.executor_ids)
            .await?;

        match new.material_payer_id {
            Some(payer_id) => {
                self.materials
                    .deduct(
                        uow,
                        payer_id,
                        new.fiber_meters,
                        new.twisted_pair_meters,
                        Some(connection_id),
                    )
                    .await?;
            }
            None => {
                let executors = new.executor_ids.len();
                let fiber_share = round_share(new.fiber_meters, executors);
                let twisted_share = round_share(new.twisted_pair_meters, executors);
                for employee_id in &new.executor_ids {
                    self.materials
                        .deduct(
                            uow,
                            *employee_id,
                            fiber_share,
                            twisted_share,
                            Some(connection_id),
                        )
                        .await?;
                }
            }
        }

        for planned in plan_equipment(new) {
            self.equipment(planned.kind)
                .deduct(
                    uow,
                    planned.payer_id,
                    planned.model,
                    planned.quantity,
                    Some(connection_id),
                )
                .await?;
        }

        self.connections
            .save_photos(uow, connection_id, &new.photo_file_ids)
            .await?;
        Ok(connection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testutil::*;
    use crate::db::{CableKind, ItemKind, Operation};

    async fn stocked_employee(db: &Db, name: &str, fiber: f64, twisted: f64) -> i64 {
        let id = db.add_employee(name).await.unwrap();
        db.add_material(Some(1), id, fiber, twisted).await.unwrap();
        id
    }

    #[test]
    fn shares_round_half_to_even() {
        assert_eq!(round_share(100.0, 2), 50.0);
        assert_eq!(round_share(100.0, 3), 33.33);
        assert_eq!(round_share(0.25, 2), 0.12);
        assert_eq!(round_share(0.75, 2), 0.38);
        assert_eq!(round_share(7.0, 0), 7.0);
    }

    #[test]
    fn sentinel_charges_are_skipped() {
        assert!(EquipmentCharge::none().is_skipped());
        assert!(EquipmentCharge::new("none", 1).is_skipped());
        assert!(EquipmentCharge::new(" - ", 2).is_skipped());
        assert!(EquipmentCharge::new("Keenetic", 0).is_skipped());
        assert!(!EquipmentCharge::new("Keenetic", 1).is_skipped());
        assert_eq!(EquipmentCharge::new("NONE", 3).stored_model(), "-");
        assert_eq!(EquipmentCharge::new("NONE", 3).stored_quantity(), 0);
    }

    #[tokio::test]
    async fn splits_materials_evenly_between_executors() {
        let db = test_db().await;
        let first = stocked_employee(&db, "Первый", 200.0, 50.0).await;
        let second = stocked_employee(&db, "Второй", 200.0, 50.0).await;

        let id = db
            .create_connection(77, NewConnection::new("ул. Мира, 1", vec![first, second], 100.0, 20.0))
            .await
            .unwrap();

        assert_eq!(db.get_employee_balance(first).await.unwrap(), (150.0, 40.0));
        assert_eq!(db.get_employee_balance(second).await.unwrap(), (150.0, 40.0));

        let deductions: Vec<_> = all_movements(&db)
            .await
            .into_iter()
            .filter(|m| m.operation == Operation::Deduct)
            .collect();
        assert_eq!(deductions.len(), 4);
        assert!(deductions.iter().all(|m| m.connection_id == Some(id)));
        assert!(deductions.iter().all(|m| m.created_by == Some(77)));

        let details = db.get_connection_by_id(id).await.unwrap().unwrap();
        assert_eq!(details.connection.created_by, 77);
        assert_eq!(details.executors.len(), 2);
    }

    #[tokio::test]
    async fn uneven_split_deducts_rounded_share() {
        let db = test_db().await;
        let ids = [
            stocked_employee(&db, "А", 50.0, 0.0).await,
            stocked_employee(&db, "Б", 50.0, 0.0).await,
            stocked_employee(&db, "В", 50.0, 0.0).await,
        ];
        db.create_connection(1, NewConnection::new("ул. Мира, 2", ids.to_vec(), 100.0, 0.0))
            .await
            .unwrap();
        for id in ids {
            assert_eq!(db.get_employee_balance(id).await.unwrap(), (16.67, 0.0));
        }
    }

    #[tokio::test]
    async fn payer_shortage_creates_nothing() {
        let db = test_db().await;
        let installer = stocked_employee(&db, "Монтажник", 500.0, 500.0).await;
        let payer = stocked_employee(&db, "Кладовщик", 10.0, 100.0).await;
        let movements_before = count_movements(&db).await;

        let mut new = NewConnection::new("ул. Мира, 3", vec![installer], 30.0, 5.0);
        new.material_payer_id = Some(payer);
        let result = db.create_connection(1, new).await;

        match result {
            Err(LedgerError::InsufficientBalance {
                employee_id,
                cable,
                ..
            }) => {
                assert_eq!(employee_id, payer);
                assert_eq!(cable, CableKind::Fiber);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(count_connection_rows(&db).await, 0);
        assert_eq!(count_movements(&db).await, movements_before);
        assert_eq!(db.get_employee_balance(installer).await.unwrap(), (500.0, 500.0));
        assert_eq!(db.get_employee_balance(payer).await.unwrap(), (10.0, 100.0));
    }

    #[tokio::test]
    async fn one_short_executor_rolls_back_everyone() {
        let db = test_db().await;
        let rich = stocked_employee(&db, "Богатый", 100.0, 100.0).await;
        let poor = stocked_employee(&db, "Бедный", 10.0, 100.0).await;

        let result = db
            .create_connection(1, NewConnection::new("ул. Мира, 4", vec![rich, poor], 60.0, 0.0))
            .await;

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance { employee_id, .. }) if employee_id == poor
        ));
        assert_eq!(db.get_employee_balance(rich).await.unwrap(), (100.0, 100.0));
        assert_eq!(count_connection_rows(&db).await, 0);
    }

    #[tokio::test]
    async fn equipment_shortage_rolls_back_materials() {
        let db = test_db().await;
        let id = stocked_employee(&db, "Монтажник", 100.0, 100.0).await;
        db.add_equipment(Some(1), EquipmentKind::Onu, id, "HG8245", 1)
            .await
            .unwrap();

        let mut new = NewConnection::new("ул. Мира, 5", vec![id], 10.0, 10.0);
        new.onu = EquipmentCharge::new("HG8245", 2);
        let result = db.create_connection(1, new).await;

        assert!(matches!(result, Err(LedgerError::InsufficientStock { .. })));
        assert_eq!(db.get_employee_balance(id).await.unwrap(), (100.0, 100.0));
        assert_eq!(
            db.get_equipment_quantity(EquipmentKind::Onu, id, "HG8245")
                .await
                .unwrap(),
            1
        );
        assert_eq!(count_connection_rows(&db).await, 0);
    }

    #[tokio::test]
    async fn equipment_goes_to_payers_and_defaults_to_first_executor() {
        let db = test_db().await;
        let first = stocked_employee(&db, "Первый", 0.0, 0.0).await;
        let second = stocked_employee(&db, "Второй", 0.0, 0.0).await;
        db.add_equipment(Some(1), EquipmentKind::Router, second, "Keenetic", 1)
            .await
            .unwrap();
        db.add_equipment(Some(1), EquipmentKind::SnrBox, first, "SNR-1", 1)
            .await
            .unwrap();
        db.add_equipment(Some(1), EquipmentKind::Onu, first, "HG8245", 2)
            .await
            .unwrap();
        db.add_equipment(Some(1), EquipmentKind::MediaConverter, second, "WDM", 2)
            .await
            .unwrap();

        let mut new = NewConnection::new("ул. Мира, 6", vec![first, second], 0.0, 0.0);
        new.router = EquipmentCharge::new("Keenetic", 1).paid_by(second);
        new.snr_box = EquipmentCharge::new("SNR-1", 0);
        new.onu = EquipmentCharge::new("HG8245", 2);
        new.media_converter = EquipmentCharge::new("WDM", 2).paid_by(second);
        let id = db.create_connection(1, new).await.unwrap();

        for kind in EquipmentKind::ALL {
            assert!(db.list_equipment_names_in_stock(kind).await.unwrap().is_empty());
        }
        let details = db.get_connection_by_id(id).await.unwrap().unwrap();
        assert_eq!(details.connection.router_model, "Keenetic");
        assert_eq!(details.connection.snr_box_model, "SNR-1");
        assert_eq!(details.connection.onu_quantity, 2);
    }

    #[tokio::test]
    async fn sentinels_and_unpaid_router_are_not_deducted() {
        let db = test_db().await;
        let id = stocked_employee(&db, "Монтажник", 0.0, 0.0).await;
        db.add_equipment(Some(1), EquipmentKind::Router, id, "Keenetic", 1)
            .await
            .unwrap();
        let before = count_movements(&db).await;

        let mut new = NewConnection::new("ул. Мира, 7", vec![id], 0.0, 0.0);
        new.router = EquipmentCharge::new("Keenetic", 1);
        new.snr_box = EquipmentCharge::new("-", 1).paid_by(id);
        new.onu = EquipmentCharge::new("none", 1);
        new.media_converter = EquipmentCharge::new("WDM", 0);
        let connection_id = db.create_connection(1, new).await.unwrap();

        assert_eq!(count_movements(&db).await, before);
        assert_eq!(
            db.get_equipment_quantity(EquipmentKind::Router, id, "Keenetic")
                .await
                .unwrap(),
            1
        );
        let details = db.get_connection_by_id(connection_id).await.unwrap().unwrap();
        assert_eq!(details.connection.onu_model, "-");
        assert_eq!(details.connection.media_converter_quantity, 0);
    }

    #[tokio::test]
    async fn validates_executors_and_keeps_photo_order() {
        let db = test_db().await;
        let id = stocked_employee(&db, "Монтажник", 10.0, 0.0).await;

        assert!(matches!(
            db.create_connection(1, NewConnection::new("ул. Мира, 8", vec![], 0.0, 0.0))
                .await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            db.create_connection(1, NewConnection::new("ул. Мира, 8", vec![id, id + 10], 0.0, 0.0))
                .await,
            Err(LedgerError::EntityNotFound { .. })
        ));
        assert_eq!(count_connection_rows(&db).await, 0);

        let mut new = NewConnection::new("ул. Мира, 8", vec![id, id], 10.0, 0.0);
        new.photo_file_ids = vec!["photo-b".to_string(), "photo-a".to_string()];
        let connection_id = db.create_connection(1, new).await.unwrap();

        let details = db.get_connection_by_id(connection_id).await.unwrap().unwrap();
        assert_eq!(details.executors.len(), 1);
        assert_eq!(details.photos, vec!["photo-b", "photo-a"]);
        assert_eq!(db.get_employee_balance(id).await.unwrap(), (0.0, 0.0));
        let fiber: Vec<_> = all_movements(&db)
            .await
            .into_iter()
            .filter(|m| m.item == ItemKind::Cable(CableKind::Fiber))
            .collect();
        assert_eq!(fiber.len(), 2);
        assert_eq!(db.count_connections().await.unwrap(), 1);
    }
}
