//! Layer taxonomy, write-mode policy, and target-path derivation.
//!
//! Each generated artifact belongs to exactly one [`LayerKind`]. The kind
//! determines the file's location inside the target project tree, the Java
//! class name, and whether regeneration may replace an existing file.

use std::fmt;
use std::path::{Path, PathBuf};

use convert_case::{Case, Casing};

/// One architectural slice of generated code for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Base entity class, fully system-owned (`Base{Table}.java`).
    EntityBase,
    /// Concrete entity extending the base class; a starting point for
    /// hand-written additions (`{Table}.java`).
    EntityImpl,
    /// MyBatis Plus mapper interface (`{Table}Mapper.java`).
    DataAccessInterface,
    /// Service interface (`{Table}Service.java`).
    ServiceInterface,
    /// Service implementation, presumed hand-extended after first generation
    /// (`{Table}ServiceImpl.java`).
    ServiceImpl,
    /// REST controller (`{Table}Controller.java`).
    RequestHandler,
    /// Mapper XML skeleton under `src/main/resources` (`{Table}Mapper.xml`).
    MappingConfig,
}

/// Whether regeneration may replace an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// System-owned file, safe to regenerate on every run.
    Overwrite,
    /// Created once, never overwritten by subsequent runs.
    Preserve,
}

impl LayerKind {
    /// All layers in generation and reporting order.
    pub const ALL: [LayerKind; 7] = [
        LayerKind::EntityBase,
        LayerKind::EntityImpl,
        LayerKind::DataAccessInterface,
        LayerKind::ServiceInterface,
        LayerKind::ServiceImpl,
        LayerKind::RequestHandler,
        LayerKind::MappingConfig,
    ];

    /// Write-mode policy per layer.
    ///
    /// Implementation layers are the only ones a developer is expected to
    /// extend by hand, so they are created once and then preserved.
    pub fn write_mode(self) -> WriteMode {
        match self {
            LayerKind::EntityBase => WriteMode::Overwrite,
            LayerKind::EntityImpl => WriteMode::Preserve,
            LayerKind::DataAccessInterface => WriteMode::Overwrite,
            LayerKind::ServiceInterface => WriteMode::Overwrite,
            LayerKind::ServiceImpl => WriteMode::Preserve,
            LayerKind::RequestHandler => WriteMode::Overwrite,
            LayerKind::MappingConfig => WriteMode::Overwrite,
        }
    }

    /// Short stable label used in reports and logs.
    pub fn label(self) -> &'static str {
        match self {
            LayerKind::EntityBase => "entity_base",
            LayerKind::EntityImpl => "entity_impl",
            LayerKind::DataAccessInterface => "dao_interface",
            LayerKind::ServiceInterface => "service_interface",
            LayerKind::ServiceImpl => "service_impl",
            LayerKind::RequestHandler => "controller",
            LayerKind::MappingConfig => "mapper_xml",
        }
    }

    /// Java class (or XML file stem) name for this layer of `table`.
    pub fn class_name(self, table: &str) -> String {
        let pascal = pascal_name(table);
        match self {
            LayerKind::EntityBase => format!("Base{}", pascal),
            LayerKind::EntityImpl => pascal,
            LayerKind::DataAccessInterface => format!("{}Mapper", pascal),
            LayerKind::ServiceInterface => format!("{}Service", pascal),
            LayerKind::ServiceImpl => format!("{}ServiceImpl", pascal),
            LayerKind::RequestHandler => format!("{}Controller", pascal),
            LayerKind::MappingConfig => format!("{}Mapper", pascal),
        }
    }

    /// Java package for this layer of `table`.
    pub fn package(self, base_package: &str, module: &str, table: &str) -> String {
        let suffix = table_suffix(table);
        let segment = match self {
            LayerKind::EntityBase | LayerKind::EntityImpl => "model",
            LayerKind::DataAccessInterface | LayerKind::MappingConfig => "mapper",
            LayerKind::ServiceInterface => "service",
            LayerKind::ServiceImpl => "service.impl",
            LayerKind::RequestHandler => "controller",
        };
        format!("{}.{}.{}.{}", base_package, module, suffix, segment)
    }

    /// Destination path inside the target project tree.
    ///
    /// Distinct (table, layer) pairs always map to distinct paths, which is
    /// what lets the pipeline run tasks concurrently without path locking.
    pub fn target_path(
        self,
        project_root: &Path,
        base_package: &str,
        module: &str,
        table: &str,
    ) -> PathBuf {
        let class = self.class_name(table);
        if self == LayerKind::MappingConfig {
            return project_root
                .join("src")
                .join("main")
                .join("resources")
                .join("mapper")
                .join(module)
                .join(format!("{}.xml", class));
        }

        let mut dir = project_root.join("src").join("main").join("java");
        for segment in base_package.split('.') {
            dir = dir.join(segment);
        }
        dir = dir.join(module).join(table_suffix(table));
        dir = match self {
            LayerKind::EntityBase | LayerKind::EntityImpl => dir.join("model"),
            LayerKind::DataAccessInterface => dir.join("mapper"),
            LayerKind::ServiceInterface => dir.join("service"),
            LayerKind::ServiceImpl => dir.join("service").join("impl"),
            LayerKind::RequestHandler => dir.join("controller"),
            LayerKind::MappingConfig => dir,
        };
        dir.join(format!("{}.java", class))
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Convert a table name to its PascalCase class stem (`sys_menu` -> `SysMenu`).
pub fn pascal_name(table: &str) -> String {
    table.to_case(Case::Pascal)
}

/// Package segment derived from a table name: everything after the first
/// underscore with the separators removed (`sys_menu_item` -> `menuitem`).
/// Tables without a module prefix use the full name.
pub fn table_suffix(table: &str) -> String {
    match table.split_once('_') {
        Some((_, rest)) => rest.replace('_', ""),
        None => table.to_string(),
    }
}
