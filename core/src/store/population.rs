use super::SynthStore;
use crate::{
    error::SynthResult,
    population::{Destination, Population, Role},
    types::{DestinationId, EntityId, MunicipalityId, ZoneId},
};
use rusqlite::params;

impl SynthStore {
    // ── Population ────────────────────────────────────────────────

    /// Write every household, dwelling and person of `population`
    /// in one transaction.
    pub fn save_population(&self, run_id: &str, population: &Population) -> SynthResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut household_stmt = tx.prepare(
                "INSERT INTO household (
                    run_id, household_id, zone, municipality, source_record, size
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut dwelling_stmt = tx.prepare(
                "INSERT INTO dwelling (
                    run_id, dwelling_id, household_id, zone, kind, bedrooms,
                    year_built, quality, monthly_cost
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            let mut person_stmt = tx.prepare(
                "INSERT INTO person (
                    run_id, person_id, household_id, age, gender, occupation,
                    job_sector, school_level, education, relationship, income,
                    role, destination_status, destination_zone, destination_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;

            for h in &population.households {
                household_stmt.execute(params![
                    run_id,
                    h.id as i64,
                    h.zone,
                    h.municipality,
                    h.source_record as i64,
                    h.size() as i64,
                ])?;

                let d = &h.dwelling;
                dwelling_stmt.execute(params![
                    run_id,
                    d.id as i64,
                    d.household_id as i64,
                    d.zone,
                    &d.kind,
                    d.bedrooms,
                    d.year_built,
                    d.quality,
                    d.monthly_cost,
                ])?;

                for p in &h.persons {
                    let (status, zone, destination) = match &p.destination {
                        None => (None, None, None),
                        Some(Destination::OutsideStudyArea) => {
                            (Some("outside_study_area"), None, None)
                        }
                        Some(Destination::Assigned { zone, destination }) => {
                            (Some("assigned"), Some(*zone), Some(*destination as i64))
                        }
                    };
                    person_stmt.execute(params![
                        run_id,
                        p.id as i64,
                        p.household_id as i64,
                        p.age,
                        p.gender.as_str(),
                        p.occupation.as_str(),
                        &p.job_sector,
                        &p.school_level,
                        p.education,
                        p.relationship.as_str(),
                        p.income,
                        p.role.map(|r| r.as_str()),
                        status,
                        zone,
                        destination,
                    ])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn household_count(&self, run_id: &str) -> SynthResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM household WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn household_count_for_municipality(
        &self,
        run_id: &str,
        municipality: MunicipalityId,
    ) -> SynthResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM household WHERE run_id = ?1 AND municipality = ?2",
            params![run_id, municipality],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn household_count_for_zone(&self, run_id: &str, zone: ZoneId) -> SynthResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM household WHERE run_id = ?1 AND zone = ?2",
            params![run_id, zone],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn dwelling_count(&self, run_id: &str) -> SynthResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM dwelling WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn person_count(&self, run_id: &str) -> SynthResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM person WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn role_count(&self, run_id: &str, role: Role) -> SynthResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM person WHERE run_id = ?1 AND role = ?2",
            params![run_id, role.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn outside_destination_count(&self, run_id: &str) -> SynthResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM person
             WHERE run_id = ?1 AND destination_status = 'outside_study_area'",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// (person, destination) for every person holding a seat.
    pub fn assigned_destinations(
        &self,
        run_id: &str,
    ) -> SynthResult<Vec<(EntityId, DestinationId)>> {
        let mut stmt = self.conn.prepare(
            "SELECT person_id, destination_id FROM person
             WHERE run_id = ?1 AND destination_status = 'assigned'
             ORDER BY person_id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id], |row| {
                Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
