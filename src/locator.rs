//! Finding boards on the bus.
//!
//! A board is addressed by its stack level, selected with jumpers. Depending on the I/O expander
//! fitted, the board answers in one of two address ranges, so every range is tried in turn.

use crate::{
    bus::RegisterBus,
    error::{ArgumentError, Error, Result},
    register::{CONFIG_LAYOUT, OUTPUT_LAYOUT},
};

pub const MOSFET8_HW_I2C_BASE_ADD: u8 = 0x38;
pub const MOSFET8_HW_I2C_ALTERNATE_BASE_ADD: u8 = 0x20;

/// The address lines are wired inverted on the board.
const ADDRESS_LINE_INVERSION: u8 = 0x07;

pub const STACK_LEVEL_MAX: u8 = 7;

/// One way of turning a stack level into a bus address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressStrategy {
    Primary,
    Alternate,
}

impl AddressStrategy {
    /// Strategies in the order they are tried.
    pub const ORDER: [AddressStrategy; 2] = [AddressStrategy::Primary, AddressStrategy::Alternate];

    fn base(&self) -> u8 {
        match self {
            AddressStrategy::Primary => MOSFET8_HW_I2C_BASE_ADD,
            AddressStrategy::Alternate => MOSFET8_HW_I2C_ALTERNATE_BASE_ADD,
        }
    }

    /// Bus address of the board at `stack` level.
    pub fn address(&self, stack: u8) -> u8 {
        (stack + self.base()) ^ ADDRESS_LINE_INVERSION
    }
}

// A board which acknowledged its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedBoard {
    pub stack: u8,
    pub address: u8,
    pub strategy: AddressStrategy,
    /// Raw configuration register as read when the board was found.
    config: u8,
}

fn check_stack<I: embedded_io::Error>(stack: u8) -> Result<(), I> {
    if stack > STACK_LEVEL_MAX {
        return Err(ArgumentError::StackLevel(stack).into());
    }
    Ok(())
}

/// Try every address strategy for `stack`, returning the first board which answers.
///
/// Nothing is written to the board.
pub fn find_board<B: RegisterBus>(
    bus: &mut B,
    stack: u8,
) -> Result<Option<LocatedBoard>, B::Error> {
    check_stack::<B::Error>(stack)?;
    for strategy in AddressStrategy::ORDER {
        let address = strategy.address(stack);
        let mut buf = [0u8; 1];
        match bus.read_registers(address, CONFIG_LAYOUT.offset, &mut buf) {
            Ok(()) => {
                tracing::debug!(stack, address, ?strategy, "Board answered");
                return Ok(Some(LocatedBoard {
                    stack,
                    address,
                    strategy,
                    config: buf[0],
                }));
            }
            Err(err) => {
                tracing::debug!(stack, address, ?strategy, "No answer: {:?}", err);
            }
        }
    }
    Ok(None)
}

/// Resolve `stack` to a bus address, initializing the board if it was never set up since power on.
///
/// Initialization makes every expander line an output and switches all channels off. A board which
/// already reports all lines as outputs is left as is.
pub fn locate<B: RegisterBus>(bus: &mut B, stack: u8) -> Result<LocatedBoard, B::Error> {
    let board = find_board(bus, stack)?.ok_or(Error::<B::Error>::BoardNotFound { stack })?;

    if board.config != 0 {
        tracing::info!(
            stack,
            address = board.address,
            "Initializing I/O expander, configuration was {:#04x}",
            board.config
        );
        bus.write_registers(board.address, CONFIG_LAYOUT.offset, &[0x00])
            .map_err(Error::Bus)?;
        bus.write_registers(board.address, OUTPUT_LAYOUT.offset, &[0xFF])
            .map_err(Error::Bus)?;
    }
    Ok(board)
}

/// Stack levels of every board on the bus, in ascending order.
pub fn discover<B: RegisterBus>(bus: &mut B) -> Result<heapless::Vec<u8, 8>, B::Error> {
    let mut found = heapless::Vec::new();
    for stack in 0..=STACK_LEVEL_MAX {
        if find_board(bus, stack)?.is_some() {
            // At most one entry per level, capacity can't run out.
            let _ = found.push(stack);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_bus::MockBus;

    #[test]
    fn addresses() {
        assert_eq!(AddressStrategy::Primary.address(0), 0x3F);
        assert_eq!(AddressStrategy::Primary.address(7), 0x38);
        assert_eq!(AddressStrategy::Alternate.address(0), 0x27);
        assert_eq!(AddressStrategy::Alternate.address(3), 0x24);
    }

    #[test]
    fn rejects_stack_level_before_bus_access() {
        let mut bus = MockBus::new();
        bus.set_read_error(true);
        let result = locate(&mut bus, 8);
        assert!(matches!(
            result,
            Err(Error::Argument(ArgumentError::StackLevel(8)))
        ));
    }

    #[test]
    fn missing_board() {
        let mut bus = MockBus::new().with_board(0x3F, true);
        assert!(matches!(
            locate(&mut bus, 1),
            Err(Error::BoardNotFound { stack: 1 })
        ));
    }

    #[test]
    fn falls_back_to_alternate_without_reinit() {
        let mut bus = MockBus::new().with_board(0x24, true);
        let board = locate(&mut bus, 3).unwrap();
        assert_eq!(board.address, 0x24);
        assert_eq!(board.strategy, AddressStrategy::Alternate);
        assert!(bus.written().is_empty());
    }

    #[test]
    fn initializes_fresh_board() {
        let mut bus = MockBus::new().with_board(0x3F, false);
        bus.set_register(0x3F, 0x01, 0x00);
        let board = locate(&mut bus, 0).unwrap();
        assert_eq!(board.strategy, AddressStrategy::Primary);
        assert_eq!(bus.register(0x3F, 0x03), 0x00);
        assert_eq!(bus.register(0x3F, 0x01), 0xFF);
        assert_eq!(bus.written().len(), 2);
        assert_eq!(bus.written()[0].register, 0x03);
        assert_eq!(bus.written()[1].register, 0x01);
    }

    #[test]
    fn primary_wins_when_both_answer() {
        let mut bus = MockBus::new().with_board(0x3F, true).with_board(0x27, true);
        assert_eq!(locate(&mut bus, 0).unwrap().address, 0x3F);
    }

    #[test]
    fn discovers_both_ranges() {
        let mut bus = MockBus::new().with_board(0x3F, true).with_board(0x24, false);
        let found = discover(&mut bus).unwrap();
        assert_eq!(found.as_slice(), &[0, 3]);
        // Discovery never initializes.
        assert!(bus.written().is_empty());
    }
}
