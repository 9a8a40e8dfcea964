//! Prompt construction for the synthesis oracle.
//!
//! Rendering is a pure function of (table schema, layer, config): no I/O,
//! no clocks, no randomness. Identical inputs always produce an identical
//! request, which is what makes regeneration reproducible.

use std::fmt::Write as _;

use crate::config::GenerationConfig;
use crate::layer::{pascal_name, table_suffix, LayerKind};
use crate::schema::TableSchema;

/// One request to the synthesis oracle: a system message carrying the layer
/// contract and a user message carrying the table facts.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub system: String,
    pub user: String,
}

/// What a layer needs in order to be materialized.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerPayload {
    /// Send this request to the oracle and write the extracted code block.
    Oracle(OracleRequest),
    /// Write this content as-is; no oracle round-trip needed.
    Verbatim(String),
}

/// Renders per-table, per-layer generation requests.
pub struct PromptBuilder<'a> {
    config: &'a GenerationConfig,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(config: &'a GenerationConfig) -> Self {
        Self { config }
    }

    /// Render the payload for one (table, layer) task.
    pub fn render(&self, schema: &TableSchema, layer: LayerKind) -> LayerPayload {
        if layer == LayerKind::MappingConfig {
            return LayerPayload::Verbatim(self.mapper_xml(schema));
        }
        LayerPayload::Oracle(OracleRequest {
            system: self.system_message(schema, layer),
            user: self.user_message(schema, layer),
        })
    }

    fn system_message(&self, schema: &TableSchema, layer: LayerKind) -> String {
        let package = layer.package(&self.config.base_package, &self.config.module_name, &schema.name);
        let class = layer.class_name(&schema.name);
        let pascal = pascal_name(&schema.name);
        let mut out = String::from(
            "You are a senior Java backend engineer generating code for a Spring Boot \
             project that uses MyBatis Plus over PostgreSQL.\n",
        );
        match layer {
            LayerKind::EntityBase => {
                writeln!(
                    out,
                    "Generate the base entity class `{}` in package `{}` for the table \
                     described by the user.\n\
                     Rules:\n\
                     1. PascalCase class name, camelCase field names.\n\
                     2. Map each column to an appropriate Java type.\n\
                     3. Add a Javadoc comment per field describing the column.\n\
                     4. Add MyBatis Plus annotations (@TableName on the class, @TableId \
                     on the primary key when one exists).\n\
                     5. Include all necessary import statements.",
                    class, package
                )
                .ok();
            }
            LayerKind::EntityImpl => {
                writeln!(
                    out,
                    "Generate the concrete entity class `{}` in package `{}`.\n\
                     Rules:\n\
                     1. It extends `Base{}` (same package) and implements \
                     java.io.Serializable.\n\
                     2. It declares no fields and no methods of its own.\n\
                     3. Include all necessary import statements.",
                    class, package, pascal
                )
                .ok();
            }
            LayerKind::DataAccessInterface => {
                writeln!(
                    out,
                    "Generate the mapper interface `{}` in package `{}`.\n\
                     Rules:\n\
                     1. It extends `BaseMapper<{}>`; the entity lives in the sibling \
                     `model` package.\n\
                     2. Declare no extra methods.\n\
                     3. Include all necessary import statements.",
                    class, package, pascal
                )
                .ok();
            }
            LayerKind::ServiceInterface => {
                writeln!(
                    out,
                    "Generate the service interface `{}` in package `{}`.\n\
                     Rules:\n\
                     1. It extends `IService<{}>`; the entity lives in the sibling \
                     `model` package.\n\
                     2. Declare no extra methods.\n\
                     3. Include all necessary import statements.",
                    class, package, pascal
                )
                .ok();
            }
            LayerKind::ServiceImpl => {
                writeln!(
                    out,
                    "Generate the service implementation `{}` in package `{}`.\n\
                     Rules:\n\
                     1. It extends `ServiceImpl<{}Mapper, {}>` and implements \
                     `{}Service`.\n\
                     2. Annotate the class with @Service.\n\
                     3. The mapper lives in the `mapper` package, the entity in the \
                     `model` package, the interface in the `service` package.\n\
                     4. Include all necessary import statements.",
                    class, package, pascal, pascal, pascal
                )
                .ok();
            }
            LayerKind::RequestHandler => {
                writeln!(
                    out,
                    "Generate the REST controller `{}` in package `{}`.\n\
                     Rules:\n\
                     1. Annotate with @RestController and @RequestMapping(\"/{}/{}\").\n\
                     2. Inject `{}Service` from the sibling `service` package.\n\
                     3. Provide basic CRUD endpoints in RESTful style over the entity \
                     `{}` from the sibling `model` package.\n\
                     4. Include all necessary import statements.",
                    class,
                    package,
                    self.config.module_name,
                    table_suffix(&schema.name),
                    pascal,
                    pascal
                )
                .ok();
            }
            LayerKind::MappingConfig => {}
        }
        out.push_str(
            "Output exactly one fenced code block (```java ... ```) containing only the \
             finished source file. No prose, no explanations, no second code block.\n",
        );
        if let Some(extra) = &self.config.prompt.extra_instructions {
            out.push_str(extra);
            if !extra.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }

    fn user_message(&self, schema: &TableSchema, layer: LayerKind) -> String {
        let mut out = String::new();
        writeln!(out, "Table: {}", schema.name).ok();
        writeln!(out, "Module: {}", self.config.module_name).ok();
        writeln!(out, "Table suffix: {}", table_suffix(&schema.name)).ok();
        writeln!(out, "Target layer: {}", layer.label()).ok();
        match schema.primary_key() {
            Some(pk) => writeln!(out, "Primary key: {}", pk.name).ok(),
            None => writeln!(out, "Primary key: none detected").ok(),
        };
        writeln!(out, "Columns:").ok();
        for column in &schema.columns {
            let nullability = if column.nullable { "NULL" } else { "NOT NULL" };
            write!(out, "  - {}: {} {}", column.name, column.data_type, nullability).ok();
            if let Some(len) = column.max_length {
                write!(out, "({})", len).ok();
            }
            if column.is_primary_key {
                out.push_str(" [PK]");
            }
            if let Some(comment) = &column.comment {
                write!(out, " comment: {}", comment).ok();
            }
            out.push('\n');
        }
        write!(out, "Class Javadoc must carry @author {}", self.config.prompt.author()).ok();
        if let Some(date) = &self.config.prompt.date_stamp {
            write!(out, " and @date {}", date).ok();
        }
        out.push_str(".\n");
        out
    }

    /// MyBatis mapper XML skeleton. Deterministic boilerplate, so it is
    /// rendered locally instead of asking the oracle for it.
    fn mapper_xml(&self, schema: &TableSchema) -> String {
        let namespace = format!(
            "{}.{}",
            LayerKind::DataAccessInterface.package(
                &self.config.base_package,
                &self.config.module_name,
                &schema.name
            ),
            LayerKind::DataAccessInterface.class_name(&schema.name)
        );
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" ?>\n\
             <!DOCTYPE mapper PUBLIC \"-//mybatis.org//DTD Mapper 3.0//EN\" \
             \"http://mybatis.org/dtd/mybatis-3-mapper.dtd\" >\n\
             <mapper namespace=\"{}\">\n\n</mapper>\n",
            namespace
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnDefinition;
    use std::path::PathBuf;

    fn test_config() -> GenerationConfig {
        serde_yaml::from_str(
            "module_name: admin\nproject_root: /tmp/target\n",
        )
        .unwrap()
    }

    fn test_schema() -> TableSchema {
        TableSchema {
            name: "sys_menu".to_string(),
            columns: vec![
                ColumnDefinition {
                    name: "id".to_string(),
                    data_type: "bigint".to_string(),
                    nullable: false,
                    is_primary_key: true,
                    max_length: None,
                    comment: Some("menu id".to_string()),
                },
                ColumnDefinition {
                    name: "title".to_string(),
                    data_type: "character varying".to_string(),
                    nullable: true,
                    is_primary_key: false,
                    max_length: Some(128),
                    comment: None,
                },
            ],
        }
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let config = test_config();
        let schema = test_schema();
        let builder = PromptBuilder::new(&config);
        for layer in LayerKind::ALL {
            let first = builder.render(&schema, layer);
            let second = builder.render(&schema, layer);
            assert_eq!(first, second, "layer {} not deterministic", layer);
        }
    }

    #[test]
    fn test_each_layer_targets_itself_only() {
        let config = test_config();
        let schema = test_schema();
        let builder = PromptBuilder::new(&config);
        let expectations = [
            (LayerKind::EntityBase, "BaseSysMenu"),
            (LayerKind::EntityImpl, "implements java.io.Serializable"),
            (LayerKind::DataAccessInterface, "BaseMapper<SysMenu>"),
            (LayerKind::ServiceInterface, "IService<SysMenu>"),
            (LayerKind::ServiceImpl, "ServiceImpl<SysMenuMapper, SysMenu>"),
            (LayerKind::RequestHandler, "@RestController"),
        ];
        for (layer, marker) in expectations {
            match builder.render(&schema, layer) {
                LayerPayload::Oracle(request) => {
                    assert!(
                        request.system.contains(marker),
                        "layer {} missing marker {:?}",
                        layer,
                        marker
                    );
                    assert!(request.system.contains("exactly one fenced code block"));
                    assert!(request.user.contains("sys_menu"));
                }
                LayerPayload::Verbatim(_) => panic!("layer {} should use the oracle", layer),
            }
        }
    }

    #[test]
    fn test_user_message_carries_column_facts() {
        let config = test_config();
        let schema = test_schema();
        let builder = PromptBuilder::new(&config);
        match builder.render(&schema, LayerKind::EntityBase) {
            LayerPayload::Oracle(request) => {
                assert!(request.user.contains("id: bigint NOT NULL [PK] comment: menu id"));
                assert!(request.user.contains("title: character varying NULL(128)"));
                // no date requested unless one is pinned in the config
                assert!(!request.user.contains("@date"));
            }
            LayerPayload::Verbatim(_) => panic!("entity base should use the oracle"),
        }
    }

    #[test]
    fn test_pinned_date_stamp_is_rendered() {
        let mut config = test_config();
        config.prompt.date_stamp = Some("2026-01-01".to_string());
        let schema = test_schema();
        match PromptBuilder::new(&config).render(&schema, LayerKind::EntityBase) {
            LayerPayload::Oracle(request) => {
                assert!(request.user.contains("@date 2026-01-01"));
            }
            LayerPayload::Verbatim(_) => panic!("entity base should use the oracle"),
        }
    }

    #[test]
    fn test_mapper_xml_rendered_locally() {
        let config = test_config();
        let schema = test_schema();
        let builder = PromptBuilder::new(&config);
        match builder.render(&schema, LayerKind::MappingConfig) {
            LayerPayload::Verbatim(xml) => {
                assert!(xml.contains("com.xhn.admin.menu.mapper.SysMenuMapper"));
                assert!(xml.starts_with("<?xml"));
            }
            LayerPayload::Oracle(_) => panic!("mapper xml must not consult the oracle"),
        }
    }

    #[test]
    fn test_config_path_unused_in_render() {
        // identical schemas with different project roots produce the same
        // prompt: output location is the writer's concern, not the oracle's
        let mut a = test_config();
        let mut b = test_config();
        a.project_root = PathBuf::from("/one");
        b.project_root = PathBuf::from("/two");
        let schema = test_schema();
        let payload_a = PromptBuilder::new(&a).render(&schema, LayerKind::EntityBase);
        let payload_b = PromptBuilder::new(&b).render(&schema, LayerKind::EntityBase);
        assert_eq!(payload_a, payload_b);
    }
}
