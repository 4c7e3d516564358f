//! JSON program store.
//!
//! Programs are kept as a JSON array of [`Program`] objects.  The firmware
//! embeds the factory set at build time; edits live in memory and can be
//! exported with [`JsonProgramStore::to_json`].

use log::{info, warn};

use crate::app::ports::{ProgramStore, StoreError};
use crate::program::{Program, ProgramMetadata};

#[derive(Debug, Clone, Default)]
pub struct JsonProgramStore {
    programs: Vec<Program>,
}

impl JsonProgramStore {
    pub fn new(programs: Vec<Program>) -> Self {
        Self { programs }
    }

    /// Parse a JSON array of programs.
    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        let programs: Vec<Program> = serde_json::from_str(text).map_err(|e| {
            warn!("Program JSON rejected: {}", e);
            StoreError::Malformed
        })?;
        info!("Program store: {} programs loaded", programs.len());
        Ok(Self { programs })
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string(&self.programs).map_err(|_| StoreError::Malformed)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl ProgramStore for JsonProgramStore {
    fn load_program_metadata(&self) -> Result<Vec<ProgramMetadata>, StoreError> {
        Ok(self.programs.iter().map(Program::metadata).collect())
    }

    fn load_program(&self, id: u32) -> Result<Program, StoreError> {
        self.programs
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Insert or replace by id.
    fn save_program(&mut self, program: &Program) -> Result<(), StoreError> {
        match self.programs.iter_mut().find(|p| p.id == program.id) {
            Some(existing) => *existing = program.clone(),
            None => self.programs.push(program.clone()),
        }
        Ok(())
    }
}
