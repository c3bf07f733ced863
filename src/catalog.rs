//! The cell catalog: port shapes, classification and logical-effort constants of every cell
//! type a [`PrefixGrid`] may instantiate, plus the [`CellRoleMap`] telling the engine which
//! catalog tag plays which role.
//!
//! The catalog is plain configuration. It can be built in code, loaded from JSON, or taken from
//! [`CellCatalog::default`], which describes the standard `ppa_*` cells:
//!
//! ```rust
//! use prefixgrid::catalog::{CellCatalog, CellRoleMap};
//! let catalog = CellCatalog::default();
//! let roles = CellRoleMap::default();
//! assert!(roles.validate(&catalog).is_ok());
//! assert!(catalog.lookup("ppa_black").unwrap().is_real);
//! ```
//!
//! [`PrefixGrid`]: crate::PrefixGrid

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{PrefixError, Result};

/// Tag of the standard invisible placeholder cell.
pub const INVISIBLE_TAG: &str = "invis";

/// Section of the tree a cell belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Section {
    Pre,
    Main,
    Post,
}

/// An input port: `total_bits` slots, the first `diag_bits` of which are fed diagonally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDef {
    pub name: String,
    pub total_bits: usize,
    pub diag_bits: usize,
}

/// An output port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutPortDef {
    pub name: String,
    pub bits: usize,
}

/// Definition of one cell type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellDef {
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<OutPortDef>,
    #[serde(default)]
    pub is_buffer: bool,
    #[serde(default)]
    pub is_real: bool,
    pub section: Section,
    pub intrinsic_delay: f64,
    /// One effort per input port, in the order of `inputs`.
    pub logical_effort: Vec<f64>,
    /// Effort used for diagonal edges, when it differs from the vertical one.
    #[serde(default)]
    pub diagonal_logical_effort: Option<Vec<f64>>,
}

impl CellDef {
    /// Effort seen by the generate path, which is the first input port.
    pub fn effort(&self, diagonal: bool) -> f64 {
        let efforts = match (&self.diagonal_logical_effort, diagonal) {
            (Some(diag), true) => diag,
            _ => &self.logical_effort,
        };
        efforts.first().copied().unwrap_or(0.0)
    }

    /// Neither a real cell nor a buffer.
    pub fn is_invisible(&self) -> bool {
        !self.is_real && !self.is_buffer
    }

    fn check_shape(&self, tag: &str) -> Result<()> {
        let invalid = |reason: String| PrefixError::InvalidCellDef {
            tag: tag.to_string(),
            reason,
        };
        if tag.is_empty() {
            return Err(invalid("empty tag".to_string()));
        }
        if self.outputs.is_empty() {
            return Err(invalid("a cell needs at least one output".to_string()));
        }
        for port in &self.inputs {
            if port.total_bits == 0 {
                return Err(invalid(format!("input {} has no bits", port.name)));
            }
            if port.diag_bits > port.total_bits {
                return Err(invalid(format!(
                    "input {} has {} diagonal bits out of {}",
                    port.name, port.diag_bits, port.total_bits
                )));
            }
        }
        if let Some(port) = self.outputs.iter().find(|port| port.bits == 0) {
            return Err(invalid(format!("output {} has no bits", port.name)));
        }
        if self.logical_effort.len() != self.inputs.len() {
            return Err(invalid(format!(
                "{} logical efforts for {} inputs",
                self.logical_effort.len(),
                self.inputs.len()
            )));
        }
        if let Some(diag) = &self.diagonal_logical_effort {
            if diag.len() != self.inputs.len() {
                return Err(invalid(format!(
                    "{} diagonal logical efforts for {} inputs",
                    diag.len(),
                    self.inputs.len()
                )));
            }
        }
        let efforts = self
            .logical_effort
            .iter()
            .chain(self.diagonal_logical_effort.iter().flatten());
        if !self.intrinsic_delay.is_finite()
            || self.intrinsic_delay < 0.0
            || efforts.clone().any(|e| !e.is_finite() || *e < 0.0)
        {
            return Err(invalid("delays and efforts must be finite and non-negative".to_string()));
        }
        if self.is_real && self.is_buffer {
            return Err(invalid("a cell cannot be both real and a buffer".to_string()));
        }
        Ok(())
    }
}

/// Read-only lookup table from cell tag to [`CellDef`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellCatalog {
    cells: BTreeMap<String, CellDef>,
}

fn port(name: &str, total_bits: usize, diag_bits: usize) -> PortDef {
    PortDef {
        name: name.to_string(),
        total_bits,
        diag_bits,
    }
}

fn out(name: &str) -> OutPortDef {
    OutPortDef {
        name: name.to_string(),
        bits: 1,
    }
}

impl Default for CellCatalog {
    fn default() -> Self {
        let mut cells = BTreeMap::new();
        cells.insert(
            "ppa_pre".to_string(),
            CellDef {
                inputs: vec![port("a_in", 1, 0), port("b_in", 1, 0)],
                outputs: vec![out("gout"), out("pout")],
                is_buffer: false,
                is_real: true,
                section: Section::Pre,
                intrinsic_delay: 1.0,
                logical_effort: vec![1.0, 1.0],
                diagonal_logical_effort: None,
            },
        );
        cells.insert(
            "ppa_post".to_string(),
            CellDef {
                inputs: vec![port("gin", 1, 0), port("pin", 1, 0)],
                outputs: vec![out("sum")],
                is_buffer: false,
                is_real: true,
                section: Section::Post,
                intrinsic_delay: 2.0,
                logical_effort: vec![1.0, 1.0],
                diagonal_logical_effort: None,
            },
        );
        cells.insert(
            "ppa_black".to_string(),
            CellDef {
                inputs: vec![port("gin", 2, 1), port("pin", 2, 1)],
                outputs: vec![out("gout"), out("pout")],
                is_buffer: false,
                is_real: true,
                section: Section::Main,
                intrinsic_delay: 2.0,
                logical_effort: vec![5.0 / 3.0, 4.0 / 3.0],
                diagonal_logical_effort: Some(vec![4.0 / 3.0, 4.0 / 3.0]),
            },
        );
        cells.insert(
            "ppa_grey".to_string(),
            CellDef {
                inputs: vec![port("gin", 2, 1), port("pin", 1, 0)],
                outputs: vec![out("gout")],
                is_buffer: false,
                is_real: true,
                section: Section::Main,
                intrinsic_delay: 2.0,
                logical_effort: vec![5.0 / 3.0, 4.0 / 3.0],
                diagonal_logical_effort: Some(vec![4.0 / 3.0, 4.0 / 3.0]),
            },
        );
        cells.insert(
            "ppa_buffer".to_string(),
            CellDef {
                inputs: vec![port("gin", 1, 0), port("pin", 1, 0)],
                outputs: vec![out("gout"), out("pout")],
                is_buffer: true,
                is_real: false,
                section: Section::Main,
                intrinsic_delay: 1.0,
                logical_effort: vec![1.0, 1.0],
                diagonal_logical_effort: None,
            },
        );
        cells.insert(
            INVISIBLE_TAG.to_string(),
            CellDef {
                inputs: vec![port("gin", 1, 0), port("pin", 1, 0)],
                outputs: vec![out("gout"), out("pout")],
                is_buffer: false,
                is_real: false,
                section: Section::Main,
                intrinsic_delay: 0.0,
                logical_effort: vec![0.0, 0.0],
                diagonal_logical_effort: None,
            },
        );
        CellCatalog { cells }
    }
}

impl CellCatalog {
    /// An empty catalog, to be filled with [`CellCatalog::register`].
    pub fn empty() -> Self {
        CellCatalog {
            cells: BTreeMap::new(),
        }
    }

    /// Loads a catalog from a JSON object mapping tags to cell definitions.
    /// Every definition goes through the same validation as [`CellCatalog::register`].
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: BTreeMap<String, CellDef> = serde_json::from_str(json)?;
        let mut catalog = CellCatalog::empty();
        for (tag, def) in raw {
            catalog.register(tag, def)?;
        }
        Ok(catalog)
    }

    /// Retrieves a cell definition from its tag.
    pub fn lookup(&self, tag: &str) -> Result<&CellDef> {
        self.cells
            .get(tag)
            .ok_or_else(|| PrefixError::UnknownCell(tag.to_string()))
    }

    /// Adds a custom cell after validating its shape. Existing tags are never overwritten.
    pub fn register(&mut self, tag: impl Into<String>, def: CellDef) -> Result<()> {
        let tag = tag.into();
        def.check_shape(&tag)?;
        if self.cells.contains_key(&tag) {
            return Err(PrefixError::InvalidCellDef {
                tag,
                reason: "tag already registered".to_string(),
            });
        }
        clilog::debug!(PG_CATALOG, "registered cell {}", tag);
        self.cells.insert(tag, def);
        Ok(())
    }

    /// Registered tags, in lexicographic order.
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.cells.keys().map(String::as_str)
    }
}

/// The catalog tags used for each role of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRoleMap {
    pub pre: String,
    pub post: String,
    pub black: String,
    pub grey: String,
    pub buffer: String,
    #[serde(default = "default_invisible")]
    pub invisible: String,
    #[serde(default)]
    pub first_pre: Option<String>,
    #[serde(default)]
    pub lspine: Option<String>,
    #[serde(default)]
    pub lspine_pre: Option<String>,
}

fn default_invisible() -> String {
    INVISIBLE_TAG.to_string()
}

impl Default for CellRoleMap {
    fn default() -> Self {
        CellRoleMap {
            pre: "ppa_pre".to_string(),
            post: "ppa_post".to_string(),
            black: "ppa_black".to_string(),
            grey: "ppa_grey".to_string(),
            buffer: "ppa_buffer".to_string(),
            invisible: default_invisible(),
            first_pre: None,
            lspine: None,
            lspine_pre: None,
        }
    }
}

impl CellRoleMap {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Pre-processing tag for a column.
    pub fn pre_for(&self, x: usize) -> &str {
        match (x, &self.first_pre, &self.lspine_pre) {
            (0, Some(tag), _) | (0, None, Some(tag)) => tag,
            _ => &self.pre,
        }
    }

    /// Buffer tag for a column.
    pub fn buffer_for(&self, x: usize) -> &str {
        match (x, &self.lspine) {
            (0, Some(tag)) => tag,
            _ => &self.buffer,
        }
    }

    /// Checks that every tag exists in the catalog and fits its role.
    pub fn validate(&self, catalog: &CellCatalog) -> Result<()> {
        let check = |role: &str, tag: &str, ok: fn(&CellDef) -> bool| -> Result<()> {
            let def = catalog.lookup(tag)?;
            if ok(def) {
                Ok(())
            } else {
                Err(PrefixError::InvalidCellDef {
                    tag: tag.to_string(),
                    reason: format!("cannot be used as the {} cell", role),
                })
            }
        };
        check("pre", &self.pre, |d| d.section == Section::Pre && d.is_real)?;
        for tag in self.first_pre.iter().chain(self.lspine_pre.iter()) {
            check("first pre", tag, |d| d.section == Section::Pre && d.is_real)?;
        }
        check("post", &self.post, |d| d.section == Section::Post && d.is_real)?;
        check("black", &self.black, |d| d.section == Section::Main && d.is_real)?;
        check("grey", &self.grey, |d| d.section == Section::Main && d.is_real)?;
        check("buffer", &self.buffer, |d| d.section == Section::Main && d.is_buffer)?;
        for tag in self.lspine.iter() {
            check("left spine buffer", tag, |d| d.section == Section::Main && d.is_buffer)?;
        }
        check("invisible", &self.invisible, |d| {
            d.section == Section::Main && d.is_invisible()
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn custom_cell() -> CellDef {
        CellDef {
            inputs: vec![port("gin", 2, 1)],
            outputs: vec![out("gout")],
            is_buffer: false,
            is_real: true,
            section: Section::Main,
            intrinsic_delay: 1.5,
            logical_effort: vec![1.2],
            diagonal_logical_effort: None,
        }
    }

    #[test]
    fn default_roles_are_valid() {
        CellRoleMap::default()
            .validate(&CellCatalog::default())
            .unwrap();
    }

    #[test]
    fn register_validates_shape() {
        let mut catalog = CellCatalog::default();
        let before = catalog.tags().count();
        catalog.register("my_black", custom_cell()).unwrap();
        assert!(catalog.lookup("my_black").is_ok());
        assert!(catalog.tags().any(|tag| tag == "my_black"));

        // Duplicate tag
        assert!(matches!(
            catalog.register("my_black", custom_cell()),
            Err(PrefixError::InvalidCellDef { .. })
        ));

        let mut bad = custom_cell();
        bad.inputs[0].diag_bits = 3;
        assert!(catalog.register("bad_diag", bad).is_err());

        let mut bad = custom_cell();
        bad.logical_effort = vec![1.0, 2.0];
        assert!(catalog.register("bad_effort", bad).is_err());

        let mut bad = custom_cell();
        bad.is_buffer = true;
        assert!(catalog.register("bad_class", bad).is_err());

        let mut bad = custom_cell();
        bad.intrinsic_delay = f64::NAN;
        assert!(catalog.register("bad_delay", bad).is_err());

        assert!(catalog.lookup("bad_diag").is_err());
        // Rejected cells are not registered
        assert_eq!(catalog.tags().count(), before + 1);
    }

    #[test]
    fn catalog_from_json() {
        let json = r#"{
            "cell": {
                "inputs": [{"name": "gin", "total_bits": 1, "diag_bits": 0}],
                "outputs": [{"name": "gout", "bits": 1}],
                "is_buffer": true,
                "section": "Main",
                "intrinsic_delay": 1.0,
                "logical_effort": [1.0]
            }
        }"#;
        let catalog = CellCatalog::from_json(json).unwrap();
        assert_eq!(catalog.tags().collect::<Vec<_>>(), vec!["cell"]);
        let cell = catalog.lookup("cell").unwrap();
        assert!(cell.is_buffer && !cell.is_real);
        assert_eq!(cell.effort(true), 1.0);

        assert!(matches!(
            CellCatalog::from_json("{ not json"),
            Err(PrefixError::Config(_))
        ));
    }

    #[test]
    fn role_map_from_json_and_spine_overrides() {
        let json = r#"{
            "pre": "ppa_pre", "post": "ppa_post", "black": "ppa_black",
            "grey": "ppa_grey", "buffer": "ppa_buffer", "lspine_pre": "first"
        }"#;
        let roles = CellRoleMap::from_json(json).unwrap();
        assert_eq!(roles.invisible, INVISIBLE_TAG);
        assert_eq!(roles.pre_for(0), "first");
        assert_eq!(roles.pre_for(3), "ppa_pre");
        assert_eq!(roles.buffer_for(0), "ppa_buffer");
        // "first" is not in the default catalog
        assert!(matches!(
            roles.validate(&CellCatalog::default()),
            Err(PrefixError::UnknownCell(_))
        ));

        let mut roles = CellRoleMap::default();
        roles.buffer = "ppa_black".to_string();
        assert!(roles.validate(&CellCatalog::default()).is_err());
    }
}
