/// Extract the `EntityPath=` segment of an Event Hubs connection string,
/// the hub name fallback when `EVENTHUB_NAME` is unset.
pub fn parse_entity_path(connection_string: &str) -> Option<String> {
    connection_string
        .split(';')
        .find_map(|part| part.strip_prefix("EntityPath="))
        .filter(|path| !path.is_empty())
        .map(str::to_owned)
}
