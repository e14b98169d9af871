use serde::Serialize;

/// Static description of one register the meter is asked for.
///
/// The meter answers a function code with one line per value and the values
/// carry no key, so `sub_names` must be in the exact order the meter sends them.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterSpec {
    pub function_code: &'static str,
    pub name: &'static str,
    pub sub_names: &'static [&'static str],
    pub description: &'static str,
}

impl RegisterSpec {
    /// Help text for a single series, `{{phase}}` is replaced by the upper case sub name
    pub fn describe(&self, sub_name: &str) -> String {
        self.description.replace("{{phase}}", &sub_name.to_uppercase())
    }

    /// Help text for the whole metric family
    pub fn describe_family(&self) -> String {
        let phases: Vec<String> = self.sub_names.iter().map(|s| s.to_uppercase()).collect();
        self.description.replace("{{phase}}", &phases.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub register_name: String,
    pub sub_name: String,
    /// Literal token as sent by the meter, e.g. "230.12"
    pub raw_value: String,
}

/// Everything one successful session returned
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    pub identity: String,
    pub serial_number: String,
    pub readings: Vec<Reading>,
}
