use crate::cli::SchemaArgs;
use crate::config::AppConfig;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use pgresource::schema::table_fingerprint;
use pgresource::{ColumnMap, ResourceEngine, SchemaCache};
use std::sync::Arc;
use tokio_postgres::NoTls;

pub async fn run(args: SchemaArgs) -> anyhow::Result<()> {
    let config = AppConfig::load(&args.config)?;
    let database_url = args
        .database
        .clone()
        .unwrap_or_else(|| config.file.database.url.clone());
    let binding = config.resource(&args.resource)?.binding()?;

    let client = connect_db(&database_url).await?;
    let engine = ResourceEngine::new(binding, config.engine_config()?, Arc::new(SchemaCache::disabled()));
    let columns = engine.describe(&client).await?;
    if columns.is_empty() {
        anyhow::bail!(
            "table {} for resource '{}' does not exist or has no columns",
            engine.binding().table,
            engine.name()
        );
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&*columns)?);
        return Ok(());
    }
    let fingerprint = table_fingerprint(&client, &engine.binding().table).await?;

    println!("resource: {} (table {})", engine.name(), engine.binding().table);
    println!("{}", column_table(&columns, &engine.binding().primary_key));
    println!("fingerprint: {fingerprint}");
    Ok(())
}

fn column_table(columns: &ColumnMap, primary_key: &str) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Column").add_attribute(Attribute::Bold),
            Cell::new("Type").add_attribute(Attribute::Bold),
            Cell::new("Not Null").add_attribute(Attribute::Bold),
            Cell::new("Default").add_attribute(Attribute::Bold),
        ]);

    for (name, ty) in columns.in_table_order() {
        let name_cell = if name == primary_key {
            Cell::new(format!("{name} (pk)")).fg(Color::Yellow)
        } else {
            Cell::new(name)
        };
        let type_color = if ty.is_json() { Color::Cyan } else { Color::Green };
        table.add_row(vec![
            Cell::new(ty.ordinal),
            name_cell,
            Cell::new(&ty.declared).fg(type_color),
            Cell::new(if ty.not_null { "yes" } else { "no" }),
            Cell::new(if ty.has_default { "yes" } else { "no" }),
        ]);
    }
    table
}

async fn connect_db(database_url: &str) -> anyhow::Result<tokio_postgres::Client> {
    let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("postgres connection error: {e}");
        }
    });
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgresource::ColumnType;

    #[test]
    fn renders_columns_in_table_order() {
        let mut id = ColumnType::named("uuid");
        id.ordinal = 1;
        id.not_null = true;
        let mut tags = ColumnType::named("jsonb");
        tags.ordinal = 2;
        let columns: ColumnMap = [("tags", tags), ("id", id)].into_iter().collect();

        let rendered = column_table(&columns, "id").to_string();
        let id_at = rendered.find("id (pk)").unwrap();
        let tags_at = rendered.find("tags").unwrap();
        assert!(id_at < tags_at);
        assert!(rendered.contains("jsonb"));
    }
}
