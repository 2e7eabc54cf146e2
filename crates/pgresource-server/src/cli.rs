use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpTopic {
    Root,
    Serve,
    Schema,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help(HelpTopic),
    Serve(ServeArgs),
    Schema(SchemaArgs),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeArgs {
    pub config: PathBuf,
    pub database: Option<String>,
    pub bind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaArgs {
    pub config: PathBuf,
    pub database: Option<String>,
    pub resource: String,
    pub json: bool,
}

const DEFAULT_CONFIG: &str = "pgresource.toml";

pub fn parse_args(args: &[String]) -> anyhow::Result<Command> {
    let mut it = args.iter().skip(1);
    let Some(first) = it.next() else {
        return Ok(Command::Help(HelpTopic::Root));
    };

    match first.as_str() {
        "-h" | "--help" | "help" => Ok(Command::Help(HelpTopic::Root)),
        "serve" => parse_serve(it.map(|s| s.as_str())),
        "schema" => parse_schema(it.map(|s| s.as_str())),
        _ => anyhow::bail!("unknown command: {first}"),
    }
}

fn parse_serve<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut database: Option<String> = None;
    let mut bind: Option<String> = None;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Serve)),
            "--config" => config = PathBuf::from(value_of("--config", it.next())?),
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="));
            }
            "--database" => database = Some(value_of("--database", it.next())?),
            _ if token.starts_with("--database=") => {
                database = Some(token.trim_start_matches("--database=").to_string());
            }
            "--bind" => bind = Some(value_of("--bind", it.next())?),
            _ if token.starts_with("--bind=") => {
                bind = Some(token.trim_start_matches("--bind=").to_string());
            }
            other => anyhow::bail!("unknown argument for serve: {other}"),
        }
    }

    Ok(Command::Serve(ServeArgs {
        config,
        database,
        bind,
    }))
}

fn parse_schema<'a>(mut it: impl Iterator<Item = &'a str>) -> anyhow::Result<Command> {
    let mut config = PathBuf::from(DEFAULT_CONFIG);
    let mut database: Option<String> = None;
    let mut resource: Option<String> = None;
    let mut json = false;

    while let Some(token) = it.next() {
        match token {
            "-h" | "--help" => return Ok(Command::Help(HelpTopic::Schema)),
            "--json" => json = true,
            "--config" => config = PathBuf::from(value_of("--config", it.next())?),
            _ if token.starts_with("--config=") => {
                config = PathBuf::from(token.trim_start_matches("--config="));
            }
            "--database" => database = Some(value_of("--database", it.next())?),
            _ if token.starts_with("--database=") => {
                database = Some(token.trim_start_matches("--database=").to_string());
            }
            "--resource" => resource = Some(value_of("--resource", it.next())?),
            _ if token.starts_with("--resource=") => {
                resource = Some(token.trim_start_matches("--resource=").to_string());
            }
            other => anyhow::bail!("unknown argument for schema: {other}"),
        }
    }

    let Some(resource) = resource else {
        anyhow::bail!("schema requires --resource <NAME>");
    };

    Ok(Command::Schema(SchemaArgs {
        config,
        database,
        resource,
        json,
    }))
}

fn value_of(flag: &str, value: Option<&str>) -> anyhow::Result<String> {
    match value {
        Some(v) => Ok(v.to_string()),
        None => anyhow::bail!("{flag} requires a value"),
    }
}

pub fn print_help(topic: HelpTopic) {
    match topic {
        HelpTopic::Root => {
            println!(
                "\
pgresource - REST resources over PostgreSQL tables

USAGE:
  pgresource <COMMAND> [OPTIONS]

COMMANDS:
  serve         Serve every configured resource over HTTP
  schema        Print the live columns of one resource
  help          Show this message

Run `pgresource <command> --help` for more."
            );
        }
        HelpTopic::Serve => {
            println!(
                "\
USAGE:
  pgresource serve [OPTIONS]

OPTIONS:
  --config <FILE>       Config file path (default: pgresource.toml)
  --database <URL>      Override database.url from config
  --bind <ADDR>         Override server.bind from config"
            );
        }
        HelpTopic::Schema => {
            println!(
                "\
USAGE:
  pgresource schema --resource <NAME> [OPTIONS]

OPTIONS:
  --resource <NAME>     Resource to describe (required)
  --config <FILE>       Config file path (default: pgresource.toml)
  --database <URL>      Override database.url from config
  --json                Print the columns as JSON instead of a table"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("pgresource")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn no_arguments_prints_root_help() {
        assert_eq!(parse_args(&args(&[])).unwrap(), Command::Help(HelpTopic::Root));
        assert_eq!(parse_args(&args(&["help"])).unwrap(), Command::Help(HelpTopic::Root));
    }

    #[test]
    fn serve_defaults_and_overrides() {
        assert_eq!(
            parse_args(&args(&["serve"])).unwrap(),
            Command::Serve(ServeArgs {
                config: PathBuf::from("pgresource.toml"),
                database: None,
                bind: None,
            })
        );
        assert_eq!(
            parse_args(&args(&[
                "serve",
                "--config=dev.toml",
                "--database",
                "postgres://localhost/app",
                "--bind",
                "0.0.0.0:9000",
            ]))
            .unwrap(),
            Command::Serve(ServeArgs {
                config: PathBuf::from("dev.toml"),
                database: Some("postgres://localhost/app".into()),
                bind: Some("0.0.0.0:9000".into()),
            })
        );
    }

    #[test]
    fn schema_requires_a_resource() {
        assert!(parse_args(&args(&["schema"])).is_err());
        let Command::Schema(schema) = parse_args(&args(&["schema", "--resource=prompts"])).unwrap()
        else {
            panic!("expected schema command");
        };
        assert_eq!(schema.resource, "prompts");
        assert!(!schema.json);
        assert_eq!(
            parse_args(&args(&["schema", "--help"])).unwrap(),
            Command::Help(HelpTopic::Schema)
        );
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(parse_args(&args(&["migrate"])).is_err());
        assert!(parse_args(&args(&["serve", "--verbose"])).is_err());
        assert!(parse_args(&args(&["serve", "--bind"])).is_err());
    }
}
