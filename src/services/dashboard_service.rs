use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::fetch_error::FetchError;
use crate::fetcher::SheetFetcher;
use crate::metrics::{self, UnitSummary};
use crate::models::{BaseTable, IndicatorRecord};
use crate::normalize::Month;
use crate::session::{DashboardSession, OverrideRow, SessionError, SessionOverride};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Unknown performance unit: {0}")]
    UnknownUnit(String),
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Failed to refresh sheet: {0}")]
    Refresh(#[from] FetchError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnitOverview {
    pub unit: String,
    pub indicator_count: usize,
}

const DEFAULT_IDLE_MINUTES: i64 = 60;

struct SessionEntry {
    session: DashboardSession,
    last_seen: DateTime<Utc>,
}

/// Application context: the loaded base table, the fetcher that can reload
/// it, and the editing sessions of connected clients.
///
/// Sessions keep the table snapshot they were created with, so a refresh
/// only affects sessions created afterwards. Sessions untouched for longer
/// than the idle timeout are dropped whenever a new one is created.
#[derive(Clone)]
pub struct DashboardService {
    fetcher: SheetFetcher,
    table: Arc<RwLock<Arc<BaseTable>>>,
    sessions: Arc<Mutex<HashMap<Uuid, SessionEntry>>>,
    idle_timeout: Duration,
}

impl DashboardService {
    pub fn new(fetcher: SheetFetcher, table: BaseTable) -> Self {
        Self {
            fetcher,
            table: Arc::new(RwLock::new(Arc::new(table))),
            sessions: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout: Duration::minutes(DEFAULT_IDLE_MINUTES),
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Fetch the sheet once and build the service around it.
    pub async fn load(fetcher: SheetFetcher) -> Result<Self, FetchError> {
        let table = fetcher.fetch_table().await?;
        Ok(Self::new(fetcher, table))
    }

    /// Current base table.
    pub fn table(&self) -> Arc<BaseTable> {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn units(&self) -> Vec<UnitOverview> {
        let table = self.table();
        table
            .units()
            .into_iter()
            .map(|unit| UnitOverview {
                unit: unit.to_string(),
                indicator_count: table.records_for_unit(unit).count(),
            })
            .collect()
    }

    pub fn unit_records(&self, unit: &str) -> Result<Vec<IndicatorRecord>, ServiceError> {
        let table = self.table();
        if !table.contains_unit(unit) {
            return Err(ServiceError::UnknownUnit(unit.to_string()));
        }
        Ok(table.records_for_unit(unit).cloned().collect())
    }

    pub fn unit_summary(&self, unit: &str) -> Result<UnitSummary, ServiceError> {
        let table = self.table();
        if !table.contains_unit(unit) {
            return Err(ServiceError::UnknownUnit(unit.to_string()));
        }
        Ok(metrics::unit_summary(table.records_for_unit(unit)))
    }

    #[instrument(skip(self))]
    pub fn create_session(&self) -> Uuid {
        let now = Utc::now();
        self.expire_idle_sessions(now);

        let id = Uuid::new_v4();
        let entry = SessionEntry {
            session: DashboardSession::new(self.table()),
            last_seen: now,
        };
        let mut sessions = self.sessions();
        sessions.insert(id, entry);
        info!("Created session {} ({} active)", id, sessions.len());
        id
    }

    /// Drop sessions idle for longer than the timeout as of `now`. Returns
    /// how many were dropped.
    pub fn expire_idle_sessions(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, entry| now - entry.last_seen <= self.idle_timeout);
        let expired = before - sessions.len();
        if expired > 0 {
            info!("Expired {} idle sessions ({} active)", expired, sessions.len());
        }
        expired
    }

    pub fn end_session(&self, id: Uuid) -> Result<(), ServiceError> {
        if self.sessions().remove(&id).is_none() {
            return Err(ServiceError::SessionNotFound(id));
        }
        debug!("Ended session {}", id);
        Ok(())
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    pub fn select_unit(&self, id: Uuid, unit: &str) -> Result<SessionOverride, ServiceError> {
        self.with_session(id, |session| session.select_unit(unit).cloned())
    }

    pub fn current_override(&self, id: Uuid) -> Result<SessionOverride, ServiceError> {
        self.with_session(id, |session| session.current().cloned())
    }

    pub fn edit_cell(
        &self,
        id: Uuid,
        row: usize,
        month: Month,
        value: Option<f64>,
    ) -> Result<OverrideRow, ServiceError> {
        self.with_session(id, |session| session.edit_cell(row, month, value).cloned())
    }

    pub fn reset(&self, id: Uuid) -> Result<SessionOverride, ServiceError> {
        self.with_session(id, |session| session.reset().cloned())
    }

    /// Re-fetch the sheet and replace the base table. On failure the current
    /// table stays in place.
    #[instrument(skip(self), fields(url = %self.fetcher.url()))]
    pub async fn refresh(&self) -> Result<Arc<BaseTable>, ServiceError> {
        let table = self.fetcher.fetch_table().await.map_err(|e| {
            error!("Sheet refresh failed, keeping current table: {}", e);
            ServiceError::Refresh(e)
        })?;

        let table = Arc::new(table);
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = table.clone();
        info!("Base table replaced ({} records)", table.records().len());
        Ok(table)
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut DashboardSession) -> Result<T, SessionError>,
    ) -> Result<T, ServiceError> {
        let mut sessions = self.sessions();
        let entry = sessions
            .get_mut(&id)
            .ok_or(ServiceError::SessionNotFound(id))?;
        entry.last_seen = Utc::now();
        Ok(f(&mut entry.session)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::parse_csv;

    const SHEET: &str = "\
Unidad,Indicador,Descripcion,Formula,Tipo,Periodicidad,Meta,Ponderacion,Ene,Feb,Mar,Abr,May,Jun,Jul,Ago,Sep,Oct,Nov,Dic
Hospital,1,Egresos,A/B,Proceso,Mensual,\"0,85\",\"0,5\",\"0,8\",\"0,9\",,,,,,,,,,
Hospital,2,Consultas,A/B,Proceso,Mensual,Glosa,\"0,5\",,,,,,,,,,,,
APS,3,Controles,A/B,Resultado,Mensual,≥90%,1,\"0,95\",,,,,,,,,,,
";

    fn service() -> DashboardService {
        let table = BaseTable::from_rows(parse_csv(SHEET).unwrap()).unwrap();
        let fetcher = SheetFetcher::new("http://127.0.0.1:9/sheet.csv")
            .unwrap()
            .with_max_retries(0);
        DashboardService::new(fetcher, table)
    }

    #[test]
    fn test_units_in_sheet_order() {
        let units = service().units();
        assert_eq!(
            units,
            vec![
                UnitOverview {
                    unit: "Hospital".to_string(),
                    indicator_count: 2
                },
                UnitOverview {
                    unit: "APS".to_string(),
                    indicator_count: 1
                },
            ]
        );
    }

    #[test]
    fn test_unit_queries_reject_unknown_unit() {
        let service = service();
        assert!(matches!(
            service.unit_records("Urgencia"),
            Err(ServiceError::UnknownUnit(_))
        ));
        assert!(matches!(
            service.unit_summary("Urgencia"),
            Err(ServiceError::UnknownUnit(_))
        ));
        assert_eq!(service.unit_records("APS").unwrap().len(), 1);
    }

    #[test]
    fn test_session_lifecycle() {
        let service = service();
        let id = service.create_session();
        assert_eq!(service.session_count(), 1);

        assert!(matches!(
            service.current_override(id),
            Err(ServiceError::Session(SessionError::NoUnitSelected))
        ));

        let selected = service.select_unit(id, "Hospital").unwrap();
        assert_eq!(selected.rows().len(), 2);

        let row = service
            .edit_cell(id, 1, Month::January, Some(40.0))
            .unwrap();
        assert_eq!(row.monthly_values.get(Month::January), Some(40.0));

        let reset = service.reset(id).unwrap();
        assert_eq!(reset, selected);

        service.end_session(id).unwrap();
        assert_eq!(service.session_count(), 0);
        assert!(matches!(
            service.end_session(id),
            Err(ServiceError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_sessions_are_isolated() {
        let service = service();
        let first = service.create_session();
        let second = service.create_session();

        service.select_unit(first, "APS").unwrap();
        service.select_unit(second, "APS").unwrap();
        service
            .edit_cell(first, 0, Month::January, Some(10.0))
            .unwrap();

        let untouched = service.current_override(second).unwrap();
        assert!((untouched.rows()[0].monthly_values.get(Month::January).unwrap() - 95.0).abs() < 1e-9);
    }

    #[test]
    fn test_idle_sessions_expire() {
        let service = service().with_idle_timeout(Duration::minutes(30));
        let idle = service.create_session();
        let active = service.create_session();
        service.select_unit(active, "APS").unwrap();

        let later = Utc::now() + Duration::minutes(20);
        assert_eq!(service.expire_idle_sessions(later), 0);
        assert_eq!(service.session_count(), 2);

        // Only the session used in the meantime survives
        service.sessions().get_mut(&active).unwrap().last_seen = later;
        let much_later = later + Duration::minutes(15);
        assert_eq!(service.expire_idle_sessions(much_later), 1);
        assert!(matches!(
            service.current_override(idle),
            Err(ServiceError::SessionNotFound(_))
        ));
        assert!(service.current_override(active).is_ok());
    }

    #[test]
    fn test_session_use_refreshes_last_seen() {
        let service = service();
        let id = service.create_session();
        let created = service.sessions()[&id].last_seen;

        service.select_unit(id, "Hospital").unwrap();
        assert!(service.sessions()[&id].last_seen >= created);
    }

    #[test]
    fn test_create_session_drops_idle_sessions() {
        let service = service().with_idle_timeout(Duration::minutes(5));
        let stale = service.create_session();
        service.sessions().get_mut(&stale).unwrap().last_seen =
            Utc::now() - Duration::minutes(10);

        service.create_session();
        assert_eq!(service.session_count(), 1);
        assert!(matches!(
            service.end_session(stale),
            Err(ServiceError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_unknown_session() {
        let service = service();
        let missing = Uuid::new_v4();
        assert!(matches!(
            service.select_unit(missing, "APS"),
            Err(ServiceError::SessionNotFound(id)) if id == missing
        ));
    }
}
