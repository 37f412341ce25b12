/// line commands for poking the active handle by hand
///
use crate::client::CacheHandle;
use crate::error::CacheError;
use crate::model::{extract_id_from_key, Product};
use std::str::FromStr;
use std::time::Duration;

pub const HELP: &str = "\
  add <key> <value>       - Add a string value
  addex <key> <ttl> <val> - Add with expiration (ttl in seconds)
  product <key> <price> <name> - Add a product, id taken from the key
  get <key>               - Get a value
  update <key> <value>    - Update a value
  del <key>               - Delete a key
  exit                    - Leave interactive mode";

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Help,
    Exit,
    Add { key: String, value: String },
    AddExpiring { key: String, ttl: u64, value: String },
    AddProduct { key: String, price: f64, name: String },
    Get { key: String },
    Update { key: String, value: String },
    Delete { key: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unknown command: {0}. Type 'help' for available commands.")]
    Unknown(String),
}

impl FromStr for Instruction {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let (command, args) = match line.split_once(' ') {
            Some((command, args)) => (command, args.trim()),
            None => (line, ""),
        };

        match command.to_lowercase().as_str() {
            "help" => Ok(Instruction::Help),
            "exit" | "quit" => Ok(Instruction::Exit),
            "add" | "set" => match args.split_once(' ') {
                Some((key, value)) => Ok(Instruction::Add {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
                None => Err(ParseError::Usage("add <key> <value>")),
            },
            "addex" => {
                let mut parts = args.splitn(3, ' ');
                let key = parts.next().unwrap_or("");
                let ttl = parts.next().and_then(|t| t.parse::<u64>().ok());
                let value = parts.next();
                match (key, ttl, value) {
                    (key, Some(ttl), Some(value)) if !key.is_empty() => Ok(Instruction::AddExpiring {
                        key: key.to_string(),
                        ttl,
                        value: value.to_string(),
                    }),
                    _ => Err(ParseError::Usage("addex <key> <ttl_seconds> <value>")),
                }
            }
            "product" => {
                let mut parts = args.splitn(3, ' ');
                let key = parts.next().unwrap_or("");
                let price = parts.next().and_then(|p| p.parse::<f64>().ok());
                let name = parts.next();
                match (key, price, name) {
                    (key, Some(price), Some(name)) if !key.is_empty() => Ok(Instruction::AddProduct {
                        key: key.to_string(),
                        price,
                        name: name.to_string(),
                    }),
                    _ => Err(ParseError::Usage("product <key> <price> <name>")),
                }
            }
            "get" if !args.is_empty() => Ok(Instruction::Get {
                key: args.to_string(),
            }),
            "get" => Err(ParseError::Usage("get <key>")),
            "update" => match args.split_once(' ') {
                Some((key, value)) => Ok(Instruction::Update {
                    key: key.to_string(),
                    value: value.to_string(),
                }),
                None => Err(ParseError::Usage("update <key> <value>")),
            },
            "del" | "delete" | "remove" if !args.is_empty() => Ok(Instruction::Delete {
                key: args.to_string(),
            }),
            "del" | "delete" | "remove" => Err(ParseError::Usage("del <key>")),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

/// the outcome of an executed instruction, left for the caller to render
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Done,
    Expires(u64),
    Product(Product),
    Value(String),
    Nil,
    Help(&'static str),
    Exit,
}

pub async fn execute(handle: &dyn CacheHandle, instruction: &Instruction) -> Result<Outcome, CacheError> {
    let outcome = match instruction {
        Instruction::Help => Outcome::Help(HELP),
        Instruction::Exit => Outcome::Exit,
        Instruction::Add { key, value } => {
            handle.add(key, value, None).await?;
            Outcome::Done
        }
        Instruction::AddExpiring { key, ttl, value } => {
            handle
                .add(key, value, Some(Duration::from_secs(*ttl)))
                .await?;
            Outcome::Expires(*ttl)
        }
        Instruction::AddProduct { key, price, name } => {
            let product = Product::new(extract_id_from_key(key), name, *price, "Added manually");
            handle.add(key, &product.to_json(), None).await?;
            Outcome::Product(product)
        }
        Instruction::Get { key } => match handle.get(key).await? {
            Some(value) => match Product::from_json(&value) {
                Some(product) => Outcome::Product(product),
                None => Outcome::Value(value),
            },
            None => Outcome::Nil,
        },
        Instruction::Update { key, value } => {
            handle.update(key, value).await?;
            Outcome::Done
        }
        Instruction::Delete { key } => {
            handle.remove(key).await?;
            Outcome::Done
        }
    };

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCache;
    use async_std::task;

    #[test]
    fn parse_commands() {
        assert_eq!(
            "add k1 hello world".parse::<Instruction>(),
            Ok(Instruction::Add {
                key: "k1".to_string(),
                value: "hello world".to_string()
            })
        );
        assert_eq!(
            "SET k1 v".parse::<Instruction>().map(|i| matches!(i, Instruction::Add { .. })),
            Ok(true)
        );
        assert_eq!(
            "addex temp 30 short lived".parse::<Instruction>(),
            Ok(Instruction::AddExpiring {
                key: "temp".to_string(),
                ttl: 30,
                value: "short lived".to_string()
            })
        );
        assert_eq!(
            "  get   product:1 ".parse::<Instruction>(),
            Ok(Instruction::Get {
                key: "product:1".to_string()
            })
        );
        assert_eq!(
            "remove k".parse::<Instruction>(),
            Ok(Instruction::Delete {
                key: "k".to_string()
            })
        );
        assert_eq!("quit".parse::<Instruction>(), Ok(Instruction::Exit));
        assert_eq!("help".parse::<Instruction>(), Ok(Instruction::Help));
    }

    #[test]
    fn parse_errors() {
        assert_eq!("".parse::<Instruction>(), Err(ParseError::Empty));
        assert_eq!(
            "add onlykey".parse::<Instruction>(),
            Err(ParseError::Usage("add <key> <value>"))
        );
        assert!(matches!(
            "addex k notanumber v".parse::<Instruction>(),
            Err(ParseError::Usage(_))
        ));
        assert_eq!("get".parse::<Instruction>(), Err(ParseError::Usage("get <key>")));
        assert_eq!(
            "product product:1 cheap Widget".parse::<Instruction>(),
            Err(ParseError::Usage("product <key> <price> <name>"))
        );
        assert_eq!("del".parse::<Instruction>(), Err(ParseError::Usage("del <key>")));
        assert_eq!(
            "flush all".parse::<Instruction>(),
            Err(ParseError::Unknown("flush".to_string()))
        );
    }

    #[test]
    fn execute_against_handle() {
        task::block_on(async move {
            let cache = MockCache::new();
            let run = |line: &str| line.parse::<Instruction>().expect("valid command");

            assert_eq!(execute(&cache, &run("add k1 v1")).await, Ok(Outcome::Done));
            assert_eq!(
                execute(&cache, &run("get k1")).await,
                Ok(Outcome::Value("v1".to_string()))
            );
            assert_eq!(execute(&cache, &run("update k1 v2")).await, Ok(Outcome::Done));
            assert_eq!(execute(&cache, &run("addex k2 5 v")).await, Ok(Outcome::Expires(5)));
            assert_eq!(execute(&cache, &run("del k1")).await, Ok(Outcome::Done));
            assert_eq!(execute(&cache, &run("get k1")).await, Ok(Outcome::Nil));
            assert!(matches!(
                execute(&cache, &run("del k1")).await,
                Err(CacheError::NotFound(_))
            ));

            let product = Product::new(3, "Widget", 9.5, "A widget");
            cache.add("product:3", &product.to_json(), None).await.unwrap();
            assert_eq!(
                execute(&cache, &run("get product:3")).await,
                Ok(Outcome::Product(product))
            );

            let added = Product::new(42, "Blue Widget", 19.99, "Added manually");
            assert_eq!(
                execute(&cache, &run("product product:42 19.99 Blue Widget")).await,
                Ok(Outcome::Product(added.clone()))
            );
            assert_eq!(
                execute(&cache, &run("get product:42")).await,
                Ok(Outcome::Product(added))
            );

            // a key without a numeric suffix gives id 0
            match execute(&cache, &run("product product:temp 1.5 Temp")).await {
                Ok(Outcome::Product(p)) => assert_eq!(p.id, 0),
                other => panic!("unexpected outcome: {:?}", other),
            }
        });
    }
}
