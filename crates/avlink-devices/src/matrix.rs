/*!
 * Matrix routing command expansion.
 *
 * HDMI matrix protocols express routing as one parameterized command,
 * e.g. `"s cir {input} {output}!"`. These helpers expand such a template
 * against the descriptor's input/output lists into concrete [`Command`]s,
 * so the coordinator and selectors never see placeholders.
 */
use crate::descriptor::{Command, LineEnding, MatrixInput, MatrixOutput};

/// Fill a routing template for one input/output pair
pub fn routing_payload(template: &str, input: u32, output: u32) -> String {
    template
        .replace("{input}", &input.to_string())
        .replace("{output}", &output.to_string())
}

/// Fill an `{input}`-only template that routes to every output
pub fn all_outputs_payload(template: &str, input: u32) -> String {
    template.replace("{input}", &input.to_string())
}

/// Expand a routing template into one command per input/output pair
///
/// Commands are generated output-major: all inputs for output 1, then
/// all inputs for output 2, and so on. Each command is an input option
/// carrying its input index as `input_value`.
pub fn expand_routing_commands(
    template: &str,
    inputs: &[MatrixInput],
    outputs: &[MatrixOutput],
    line_ending: LineEnding,
) -> Vec<Command> {
    let mut commands = Vec::with_capacity(inputs.len() * outputs.len());

    for output in outputs {
        for input in inputs {
            let mut command = Command::new(
                format!("route_in{}_out{}", input.index, output.index),
                format!("{} -> {}", input.name, output.name),
                routing_payload(template, input.index, output.index),
            )
            .with_line_ending(line_ending);
            command.is_input_option = true;
            command.input_value = input.index.to_string();
            commands.push(command);
        }
    }

    commands
}

/// Expand a status-query template against the output list
///
/// A template containing `{output}` yields one query per output; a
/// template without it yields a single query for the whole matrix.
pub fn expand_status_commands(
    template: &str,
    outputs: &[MatrixOutput],
    line_ending: LineEnding,
) -> Vec<Command> {
    if template.contains("{output}") {
        outputs
            .iter()
            .map(|output| {
                Command::new(
                    format!("query_status_out{}", output.index),
                    format!("Query {} Status", output.name),
                    template.replace("{output}", &output.index.to_string()),
                )
                .with_line_ending(line_ending)
                .as_query()
            })
            .collect()
    } else {
        vec![Command::new("query_status", "Query Status", template)
            .with_line_ending(line_ending)
            .as_query()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(index: u32, name: &str) -> MatrixInput {
        MatrixInput {
            index,
            name: name.to_string(),
            device_id: None,
        }
    }

    fn output(index: u32, name: &str) -> MatrixOutput {
        MatrixOutput {
            index,
            name: name.to_string(),
            device_id: None,
        }
    }

    #[test]
    fn test_routing_payload() {
        assert_eq!(routing_payload("s cir {input} {output}", 3, 7), "s cir 3 7");
    }

    #[test]
    fn test_all_outputs_payload() {
        assert_eq!(all_outputs_payload("s in {input} av", 2), "s in 2 av");
    }

    #[test]
    fn test_expand_routing_commands() {
        let inputs = vec![input(1, "Sky Box"), input(2, "Streamer")];
        let outputs = vec![output(1, "Bar TV")];

        let commands =
            expand_routing_commands("s cir {input} {output}", &inputs, &outputs, LineEnding::Exclamation);

        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].command_id, "route_in1_out1");
        assert_eq!(commands[0].payload, "s cir 1 1");
        assert_eq!(commands[0].line_ending, LineEnding::Exclamation);
        assert!(commands[0].is_input_option);
        assert_eq!(commands[0].input_value, "1");
        assert_eq!(commands[1].payload, "s cir 2 1");
        assert_eq!(commands[1].name, "Streamer -> Bar TV");
    }

    #[test]
    fn test_expand_routing_is_output_major() {
        let inputs = vec![input(1, "A"), input(2, "B")];
        let outputs = vec![output(1, "X"), output(2, "Y")];

        let commands = expand_routing_commands("{input}/{output}", &inputs, &outputs, LineEnding::None);
        let payloads: Vec<&str> = commands.iter().map(|c| c.payload.as_str()).collect();
        assert_eq!(payloads, vec!["1/1", "2/1", "1/2", "2/2"]);
    }

    #[test]
    fn test_expand_status_per_output() {
        let outputs = vec![output(1, "Bar TV"), output(2, "Patio TV")];
        let commands = expand_status_commands("r av {output}", &outputs, LineEnding::Exclamation);

        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].command_id, "query_status_out1");
        assert_eq!(commands[0].payload, "r av 1");
        assert!(commands[0].is_query);
        assert_eq!(commands[1].payload, "r av 2");
    }

    #[test]
    fn test_expand_status_without_placeholder_is_single_query() {
        let outputs = vec![output(1, "Bar TV"), output(2, "Patio TV")];
        let commands = expand_status_commands("r status", &outputs, LineEnding::Cr);

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].command_id, "query_status");
        assert_eq!(commands[0].payload, "r status");
        assert!(commands[0].is_query);
    }
}
