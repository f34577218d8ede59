//! Metric store adapter: typed operations over the shared Postgres database.
//!
//! Every operation returns `Result<_, StoreError>`; per the error taxonomy
//! (see [`crate::error`]) a failure here is `TransientIO` — callers log it
//! and retry on the next tick, they never propagate it out of the agent loop.

pub mod models;

use std::collections::HashMap;

use sqlx::{PgPool, Row};

use crate::error::StoreError;
use models::HostState;

/// Handle to the shared relational metric store.
#[derive(Clone)]
pub struct MetricStore {
    pool: PgPool,
}

impl MetricStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Last `limit` CPU MHz samples for a VM, chronological.
    pub async fn select_cpu_mhz_for_vm(&self, uuid: &str, limit: u32) -> Result<Vec<u32>, StoreError> {
        let rows = sqlx::query(
            "SELECT cpu_mhz FROM (
                 SELECT s.cpu_mhz, s.timestamp_sec FROM vm_cpu_mhz s
                 JOIN vms v ON v.id = s.vm_id WHERE v.uuid = $1
                 ORDER BY s.timestamp_sec DESC LIMIT $2
             ) t ORDER BY timestamp_sec ASC",
        )
        .bind(uuid)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get::<i32, _>("cpu_mhz") as u32).collect())
    }

    /// Latest CPU MHz per VM; VMs with no samples are simply absent (callers
    /// treat an absent key as 0 per the spec's contract).
    pub async fn select_last_cpu_mhz_for_vms(&self) -> Result<HashMap<String, u32>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT ON (v.uuid) v.uuid, s.cpu_mhz
             FROM vm_cpu_mhz s JOIN vms v ON v.id = s.vm_id
             ORDER BY v.uuid, s.timestamp_sec DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("uuid"), r.get::<i32, _>("cpu_mhz") as u32))
            .collect())
    }

    /// Latest CPU MHz per host.
    pub async fn select_last_cpu_mhz_for_hosts(&self) -> Result<HashMap<String, u32>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT ON (h.hostname) h.hostname, s.cpu_mhz
             FROM host_cpu_mhz s JOIN hosts h ON h.id = s.host_id
             ORDER BY h.hostname, s.timestamp_sec DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("hostname"), r.get::<i32, _>("cpu_mhz") as u32))
            .collect())
    }

    /// Upserts a VM by UUID, returning its stable integer id.
    pub async fn select_vm_id(&self, uuid: &str) -> Result<i64, StoreError> {
        if let Some(row) = sqlx::query("SELECT id FROM vms WHERE uuid = $1")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok(row.get("id"));
        }
        let row = sqlx::query("INSERT INTO vms (uuid) VALUES ($1) RETURNING id")
            .bind(uuid)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("id"))
    }

    /// Upserts a host's characteristics, returning its stable integer id.
    pub async fn update_host(&self, hostname: &str, cpu_mhz: u32, cpu_cores: u32, ram_mb: u64) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "INSERT INTO hosts (hostname, cpu_mhz, cpu_cores, ram_mb) VALUES ($1, $2, $3, $4)
             ON CONFLICT (hostname) DO UPDATE SET cpu_mhz = EXCLUDED.cpu_mhz,
                 cpu_cores = EXCLUDED.cpu_cores, ram_mb = EXCLUDED.ram_mb
             RETURNING id",
        )
        .bind(hostname)
        .bind(cpu_mhz as i32)
        .bind(cpu_cores as i32)
        .bind(ram_mb as i64)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("id"))
    }

    /// Bulk-appends VM CPU MHz samples, auto-registering any new UUID.
    pub async fn insert_vm_cpu_mhz(&self, samples: &HashMap<String, u32>, timestamp_sec: i64) -> Result<(), StoreError> {
        for (uuid, mhz) in samples {
            let vm_id = self.select_vm_id(uuid).await?;
            sqlx::query("INSERT INTO vm_cpu_mhz (vm_id, timestamp_sec, cpu_mhz) VALUES ($1, $2, $3)")
                .bind(vm_id)
                .bind(timestamp_sec)
                .bind(*mhz as i32)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn insert_host_cpu_mhz(&self, hostname: &str, mhz: u32, timestamp_sec: i64) -> Result<(), StoreError> {
        let host_id = self
            .select_host_id(hostname)
            .await?
            .ok_or_else(|| StoreError::NotFound(hostname.to_string()))?;
        sqlx::query("INSERT INTO host_cpu_mhz (host_id, timestamp_sec, cpu_mhz) VALUES ($1, $2, $3)")
            .bind(host_id)
            .bind(timestamp_sec)
            .bind(mhz as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Per-host MHz/cores/RAM, all keyed by hostname.
    #[allow(clippy::type_complexity)]
    pub async fn select_host_characteristics(
        &self,
    ) -> Result<(HashMap<String, u32>, HashMap<String, u32>, HashMap<String, u64>), StoreError> {
        let rows = sqlx::query("SELECT hostname, cpu_mhz, cpu_cores, ram_mb FROM hosts")
            .fetch_all(&self.pool)
            .await?;
        let mut mhz = HashMap::new();
        let mut cores = HashMap::new();
        let mut ram = HashMap::new();
        for row in rows {
            let hostname: String = row.get("hostname");
            mhz.insert(hostname.clone(), row.get::<i32, _>("cpu_mhz") as u32);
            cores.insert(hostname.clone(), row.get::<i32, _>("cpu_cores") as u32);
            ram.insert(hostname, row.get::<i64, _>("ram_mb") as u64);
        }
        Ok((mhz, cores, ram))
    }

    /// Latest power state per host; hosts with no row default to `Active`.
    pub async fn select_host_states(&self) -> Result<HashMap<String, HostState>, StoreError> {
        let rows = sqlx::query(
            "SELECT h.hostname, COALESCE(
                (SELECT s.state FROM host_states s WHERE s.host_id = h.id
                 ORDER BY s.timestamp_sec DESC LIMIT 1), 1) AS state
             FROM hosts h",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>("hostname"), HostState::from(r.get::<i16, _>("state"))))
            .collect())
    }

    pub async fn select_active_hosts(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .select_host_states()
            .await?
            .into_iter()
            .filter(|(_, s)| *s == HostState::Active)
            .map(|(h, _)| h)
            .collect())
    }

    pub async fn select_inactive_hosts(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .select_host_states()
            .await?
            .into_iter()
            .filter(|(_, s)| *s == HostState::Asleep)
            .map(|(h, _)| h)
            .collect())
    }

    /// Bulk-sets host power states.
    pub async fn insert_host_states(&self, states: &HashMap<String, HostState>, timestamp_sec: i64) -> Result<(), StoreError> {
        for (hostname, state) in states {
            let host_id = self
                .select_host_id(hostname)
                .await?
                .ok_or_else(|| StoreError::NotFound(hostname.clone()))?;
            sqlx::query("INSERT INTO host_states (host_id, timestamp_sec, state) VALUES ($1, $2, $3)")
                .bind(host_id)
                .bind(timestamp_sec)
                .bind(*state as i16)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    pub async fn insert_host_overload(&self, hostname: &str, overloaded: bool, timestamp_sec: i64) -> Result<(), StoreError> {
        let host_id = self
            .select_host_id(hostname)
            .await?
            .ok_or_else(|| StoreError::NotFound(hostname.to_string()))?;
        sqlx::query("INSERT INTO host_overload_events (host_id, timestamp_sec, overloaded) VALUES ($1, $2, $3)")
            .bind(host_id)
            .bind(timestamp_sec)
            .bind(overloaded)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_vm_migration(&self, uuid: &str, destination: &str, timestamp_sec: i64) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO vm_migration_events (vm_uuid, destination_host, timestamp_sec) VALUES ($1, $2, $3)")
            .bind(uuid)
            .bind(destination)
            .bind(timestamp_sec)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn cleanup_vm_resource_usage(&self, before: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM vm_cpu_mhz WHERE timestamp_sec < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn cleanup_host_resource_usage(&self, before: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM host_cpu_mhz WHERE timestamp_sec < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Stable integer id for a host, if already registered.
    pub async fn select_host_id(&self, hostname: &str) -> Result<Option<i64>, StoreError> {
        Ok(sqlx::query("SELECT id FROM hosts WHERE hostname = $1")
            .bind(hostname)
            .fetch_optional(&self.pool)
            .await?
            .map(|r| r.get("id")))
    }

    pub async fn select_host_ids(&self) -> Result<HashMap<String, i64>, StoreError> {
        let rows = sqlx::query("SELECT hostname, id FROM hosts").fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| (r.get("hostname"), r.get("id"))).collect())
    }
}
