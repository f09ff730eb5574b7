use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Validated,
    states: [Validated, Parsed, Chunked, Enriched, Embedded, Indexed, Finalized, Failed],
    events {
        parse { transition: { from: Validated, to: Parsed } }
        chunk { transition: { from: Parsed, to: Chunked } }
        enrich { transition: { from: Chunked, to: Enriched } }
        embed { transition: { from: Enriched, to: Embedded } }
        index { transition: { from: Embedded, to: Indexed } }
        finalize { transition: { from: Indexed, to: Finalized } }
        abort {
            transition: { from: Validated, to: Failed }
            transition: { from: Parsed, to: Failed }
            transition: { from: Chunked, to: Failed }
            transition: { from: Enriched, to: Failed }
            transition: { from: Embedded, to: Failed }
            transition: { from: Indexed, to: Failed }
        }
    }
}

pub fn validated() -> IngestionMachine<(), Validated> {
    IngestionMachine::new(())
}
