// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use tower::BoxError;

/// Parse a single key-value pair
pub(crate) fn parse_key_val<T, U>(s: &str) -> Result<(T, U), BoxError>
where
    T: std::str::FromStr,
    T::Err: Error + Send + Sync + 'static,
    U: std::str::FromStr,
    U::Err: Error + Send + Sync + 'static,
{
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    Ok((s[..pos].parse()?, s[pos + 1..].parse()?))
}

/// Split a comma separated broker list, dropping empty entries
pub(crate) fn parse_broker_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_key_val_single_pair() {
        let result = parse_key_val::<String, String>("linger.ms=5").unwrap();
        assert_eq!(result, ("linger.ms".to_string(), "5".to_string()));
    }

    #[test]
    fn test_parse_key_val_value_with_equals() {
        let result = parse_key_val::<String, String>("sasl.jaas=a=b").unwrap();
        assert_eq!(result, ("sasl.jaas".to_string(), "a=b".to_string()));
    }

    #[test]
    fn test_parse_key_val_invalid_no_equals() {
        let result = parse_key_val::<String, String>("invalid");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("no `=` found"));
    }

    #[test]
    fn test_parse_broker_list() {
        assert_eq!(
            vec!["b1:9092".to_string(), "b2:9092".to_string()],
            parse_broker_list(" b1:9092, b2:9092,")
        );
        assert!(parse_broker_list("").is_empty());
        assert!(parse_broker_list(" , ").is_empty());
    }
}
