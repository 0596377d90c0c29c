use std::sync::Arc;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentStatistics, AppointmentStatus,
    AppointmentType, StatusCount, TypeCount,
};
use crate::services::store::AppointmentStore;

pub struct StatisticsService {
    store: Arc<dyn AppointmentStore>,
}

impl StatisticsService {
    pub fn new(store: Arc<dyn AppointmentStore>) -> Self {
        Self { store }
    }

    /// Counts over active appointments matching `filter`. The status filter, if
    /// any, is ignored so the breakdown always covers every status.
    pub async fn get_statistics(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<AppointmentStatistics, AppointmentError> {
        let mut query = filter.to_query();
        query.statuses = None;

        let appointments = self.store.find(&query).await?;
        Ok(aggregate(&appointments))
    }
}

/// Groups in enum declaration order; statuses and types with no rows are omitted.
pub fn aggregate(appointments: &[Appointment]) -> AppointmentStatistics {
    let status_stats = AppointmentStatus::ALL
        .iter()
        .map(|status| StatusCount {
            status: *status,
            count: appointments.iter().filter(|a| a.status == *status).count(),
        })
        .filter(|entry| entry.count > 0)
        .collect();

    let type_stats = AppointmentType::ALL
        .iter()
        .map(|appointment_type| TypeCount {
            appointment_type: *appointment_type,
            count: appointments
                .iter()
                .filter(|a| a.appointment_type == *appointment_type)
                .count(),
        })
        .filter(|entry| entry.count > 0)
        .collect();

    AppointmentStatistics {
        total_appointments: appointments.len(),
        status_stats,
        type_stats,
    }
}
