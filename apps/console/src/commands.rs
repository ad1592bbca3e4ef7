//! Console commands parsed from one input line.

use shared::domain::{Credentials, FamilyId, PlanId};

pub const HELP: &str = "\
commands:
  signin <email> <password>   sign in (any credentials work in demo mode)
  signup <email> <password>   register a new account
  signout                     end the session
  families                    reload the family list
  create <name...>            create a family and select it
  select <family-id>          switch the current family
  plans                       show the pricing tiers
  checkout <plan-id>          start checkout for the current family
  state                       print the session state
  help                        show this text
  quit                        exit";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    SignIn(Credentials),
    SignUp(Credentials),
    SignOut,
    Families,
    Create { name: String },
    Select(FamilyId),
    Plans,
    Checkout(PlanId),
    State,
    Help,
    Quit,
}

impl Command {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let command = match verb.to_ascii_lowercase().as_str() {
            "signin" | "login" => Command::SignIn(credentials(verb, &rest)?),
            "signup" | "register" => Command::SignUp(credentials(verb, &rest)?),
            "signout" | "logout" => Command::SignOut,
            "families" | "ls" => Command::Families,
            "create" => {
                if rest.is_empty() {
                    return Err("usage: create <name...>".into());
                }
                Command::Create {
                    name: rest.join(" "),
                }
            }
            "select" => match rest.as_slice() {
                [id] => Command::Select(FamilyId::from(*id)),
                _ => return Err("usage: select <family-id>".into()),
            },
            "plans" => Command::Plans,
            "checkout" => match rest.as_slice() {
                [plan] => Command::Checkout(PlanId::from(*plan)),
                _ => return Err("usage: checkout <plan-id>".into()),
            },
            "state" => Command::State,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("unknown command '{other}', try 'help'")),
        };
        Ok(Some(command))
    }
}

fn credentials(verb: &str, rest: &[&str]) -> Result<Credentials, String> {
    match rest {
        [email, password] => Ok(Credentials::new(*email, *password)),
        _ => Err(format!("usage: {verb} <email> <password>")),
    }
}
